pub mod queries;
pub mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::date_util::round_half_up;
use crate::error::{Error, Result};
use crate::query::period::DateRanges;
use crate::storage::Database;

/// How many deals the summary lists.
pub const RECENT_DEALS_LIMIT: u32 = 10;

/// Shown when a recent deal's client is missing or unnamed.
pub const UNKNOWN_CLIENT_NAME: &str = "Cliente";

/// Shown when the tenant has no named user to act as owner.
pub const DEFAULT_OWNER_NAME: &str = "Equipo Comercial";

/// Compute the dashboard summary for one tenant over a resolved window.
///
/// The aggregation reads are independent of each other and are issued
/// together; the first failure fails the whole summary. With `timeout` set,
/// any read that exceeds it yields [`Error::Timeout`].
pub async fn compute_summary(
    db: &Database,
    company_id: &str,
    window: DateRanges,
    timeout: Option<Duration>,
) -> Result<MetricsSummary> {
    let started = Instant::now();
    let bounds = window.bound_keys();
    let [cur_start, cur_end, prev_start, prev_end] = bounds.clone();
    let tenant = company_id.to_string();

    let clients = {
        let (tenant, bounds) = (tenant.clone(), bounds);
        read(db, timeout, move |conn| {
            queries::client_counts(conn, &tenant, &bounds)
        })
    };
    let current = {
        let (tenant, start, end) = (tenant.clone(), cur_start.clone(), cur_end.clone());
        read(db, timeout, move |conn| {
            queries::deal_aggregates(conn, &tenant, &start, &end)
        })
    };
    let previous = {
        let tenant = tenant.clone();
        read(db, timeout, move |conn| {
            queries::deal_aggregates(conn, &tenant, &prev_start, &prev_end)
        })
    };
    let stages = {
        let (tenant, start, end) = (tenant.clone(), cur_start.clone(), cur_end.clone());
        read(db, timeout, move |conn| {
            queries::stage_counts(conn, &tenant, &start, &end)
        })
    };
    let pending_tasks = {
        let tenant = tenant.clone();
        read(db, timeout, move |conn| queries::pending_task_count(conn, &tenant))
    };
    let recent_deals = read(db, timeout, move |conn| {
        queries::recent_deals(conn, &tenant, &cur_start, &cur_end, RECENT_DEALS_LIMIT)
    });

    let (clients, current, previous, stages, pending_tasks, recent_deals) = tokio::try_join!(
        clients,
        current,
        previous,
        stages,
        pending_tasks,
        recent_deals
    )?;

    let summary = compose_summary(
        RawAggregates {
            clients,
            current,
            previous,
            stages,
            pending_tasks,
            recent_deals,
        },
        window,
    );
    log::debug!(
        "Metrics for company {company_id} computed in {:?} ({} deals in window)",
        started.elapsed(),
        summary.total_deals
    );
    Ok(summary)
}

/// Run one read on the reader connection, bounded by `timeout` if given.
async fn read<T, F>(db: &Database, timeout: Option<Duration>, query: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> std::result::Result<T, rusqlite::Error> + Send + 'static,
{
    let call = db.reader().call(move |conn| query(conn));
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => call.await,
    };
    Ok(result?)
}

/// Turn raw aggregates into the summary: rates, rounding, deltas, placeholders.
pub fn compose_summary(raw: RawAggregates, window: DateRanges) -> MetricsSummary {
    let RawAggregates {
        clients,
        current,
        previous,
        stages,
        pending_tasks,
        recent_deals,
    } = raw;

    let current_rate = conversion_rate(current.won_count, current.total);
    let previous_rate = conversion_rate(previous.won_count, previous.total);

    let deals_by_stage: BTreeMap<_, _> = stages
        .into_iter()
        .filter(|s| s.count > 0)
        .map(|s| (s.stage, s.count))
        .collect();

    let recent_deals = recent_deals
        .into_iter()
        .map(|row| RecentDeal {
            id: row.id,
            title: row.title,
            client_name: row
                .client_name
                .unwrap_or_else(|| UNKNOWN_CLIENT_NAME.to_string()),
            owner_name: row
                .owner_name
                .unwrap_or_else(|| DEFAULT_OWNER_NAME.to_string()),
            value: row.value,
            stage: row.stage,
            created_at: row.created_at,
        })
        .collect();

    MetricsSummary {
        total_clients: clients.current,
        total_deals: current.total,
        active_deals: current.active,
        deals_by_stage,
        won_value_sum: current.won_value_sum,
        conversion_rate: current_rate,
        pipeline_value: current.pipeline_value,
        avg_deal_value: current.avg_deal_value,
        avg_close_days: round_half_up(current.avg_close_days, 1),
        pending_tasks,
        whatsapp_connected: true,
        comparison: Comparison {
            clients_vs_previous: clients.current as i64 - clients.previous as i64,
            active_deals_vs_previous: current.active as i64 - previous.active as i64,
            won_value_vs_previous: round_half_up(
                current.won_value_sum - previous.won_value_sum,
                2,
            ),
            conversion_vs_previous: current_rate as i64 - previous_rate as i64,
        },
        recent_deals,
        window,
    }
}

/// Won deals as a whole percentage of all deals; 0 when there are none.
pub fn conversion_rate(won: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = round_half_up(won as f64 / total as f64 * 100.0, 0);
    pct.clamp(0.0, 100.0) as u32
}
