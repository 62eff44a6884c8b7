use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::DealStage;
use crate::query::period::DateRanges;

/// Clients created in the current and previous windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCounts {
    pub current: u64,
    pub previous: u64,
}

/// Deal aggregates for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DealAggregates {
    pub total: u64,
    /// Deals not in WON or LOST.
    pub active: u64,
    pub won_count: u64,
    pub won_value_sum: f64,
    /// Value of active deals.
    pub pipeline_value: f64,
    pub avg_deal_value: f64,
    /// Unrounded mean of `close_date - created_at` over WON deals with a close date.
    pub avg_close_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageCount {
    pub stage: DealStage,
    pub count: u64,
}

/// A recent deal as read from storage; joined names may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentDealRow {
    pub id: String,
    pub title: String,
    pub client_name: Option<String>,
    pub owner_name: Option<String>,
    pub value: f64,
    pub stage: DealStage,
    pub created_at: String,
}

/// Everything the aggregation reads produce for one summary.
#[derive(Debug, Clone, Default)]
pub struct RawAggregates {
    pub clients: ClientCounts,
    pub current: DealAggregates,
    pub previous: DealAggregates,
    pub stages: Vec<StageCount>,
    pub pending_tasks: u64,
    pub recent_deals: Vec<RecentDealRow>,
}

/// Current-window value minus previous-window value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Comparison {
    pub clients_vs_previous: i64,
    pub active_deals_vs_previous: i64,
    /// Rounded to 2 decimals.
    pub won_value_vs_previous: f64,
    /// Difference of the two already-rounded rates.
    pub conversion_vs_previous: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentDeal {
    pub id: String,
    pub title: String,
    pub client_name: String,
    pub owner_name: String,
    pub value: f64,
    pub stage: DealStage,
    pub created_at: String,
}

/// Dashboard summary for one tenant and reporting window. Computed on
/// demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_clients: u64,
    pub total_deals: u64,
    pub active_deals: u64,
    /// Only stages with at least one deal in the window; missing keys mean zero.
    pub deals_by_stage: BTreeMap<DealStage, u64>,
    pub won_value_sum: f64,
    /// Whole percent, 0 to 100.
    pub conversion_rate: u32,
    pub pipeline_value: f64,
    pub avg_deal_value: f64,
    /// Rounded to 1 decimal.
    pub avg_close_days: f64,
    /// Open tasks across all time, not just the window.
    pub pending_tasks: u64,
    // TODO: derive from the messaging integration's connection state once it reports one.
    pub whatsapp_connected: bool,
    pub comparison: Comparison,
    pub recent_deals: Vec<RecentDeal>,
    /// The windows this summary was computed for.
    #[serde(skip)]
    pub window: DateRanges,
}
