pub mod clock;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod model;
pub mod query;
pub mod storage;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use metrics::{Comparison, MetricsSummary, RecentDeal};
pub use model::{
    Activity, ActivityType, Client, ClientUpdate, Company, Deal, DealStage, DealUpdate,
    NewActivity, NewClient, NewDeal, NewTask, Page, RelatedType, Task, TaskFilter, User,
    UserRole,
};
pub use query::builder::DealQuery;
pub use query::period::{DateRanges, MetricsPeriod, RangeRequest};
pub use storage::Database;

use date_util::{format_date, format_timestamp, parse_calendar_date};
use storage::repository;

/// Config key holding the tenant used when none is given explicitly.
pub const DEFAULT_COMPANY_KEY: &str = "company_id";

/// Main entry point: tenant-scoped CRM records and the metrics dashboard.
pub struct SalesCore {
    db: Database,
    clock: Arc<dyn Clock>,
    query_timeout: Option<Duration>,
}

impl SalesCore {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            query_timeout: None,
        }
    }

    /// Bound each metrics read by `timeout`.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }

    fn today(&self) -> String {
        format_date(self.clock.now().date())
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Resolve a period request against the current clock.
    pub fn resolve_range(&self, request: &RangeRequest) -> DateRanges {
        query::period::resolve(request, self.clock.now())
    }

    /// Dashboard summary for one tenant. The tenant id is trusted as given.
    pub async fn metrics_summary(
        &self,
        company_id: &str,
        request: &RangeRequest,
    ) -> Result<MetricsSummary> {
        let window = self.resolve_range(request);
        metrics::compute_summary(&self.db, company_id, window, self.query_timeout).await
    }

    // ── Companies & users ──────────────────────────────────────────

    pub async fn create_company(&self, name: &str) -> Result<Company> {
        let name = require_min_chars("company name", name, 2)?;
        let now = self.now();
        let company = self
            .db
            .writer()
            .call(move |conn| repository::insert_company(conn, &name, &now))
            .await?;
        log::info!("Created company {} ({})", company.name, company.id);
        Ok(company)
    }

    pub async fn get_company(&self, id: &str) -> Result<Option<Company>> {
        let id = id.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_company(conn, &id))
            .await?)
    }

    pub async fn create_user(
        &self,
        company_id: &str,
        name: &str,
        email: &str,
        role: UserRole,
    ) -> Result<User> {
        let name = require_min_chars("user name", name, 2)?;
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(Error::InvalidInput(format!("invalid email: {email}")));
        }
        let company_id = company_id.to_string();
        let now = self.now();
        let user = self
            .db
            .writer()
            .call(move |conn| {
                if repository::get_company(conn, &company_id)?.is_none() {
                    return Ok::<_, rusqlite::Error>(None);
                }
                repository::insert_user(conn, &company_id, &name, &email, role, &now).map(Some)
            })
            .await?
            .ok_or_else(|| Error::NotFound("company".into()))?;
        log::info!("Created user {} in company {}", user.id, user.company_id);
        Ok(user)
    }

    pub async fn list_users(&self, company_id: &str) -> Result<Vec<User>> {
        let company_id = company_id.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::list_users(conn, &company_id))
            .await?)
    }

    /// The tenant to act on: `explicit` if given, else the `company_id`
    /// config key.
    pub async fn resolve_company(&self, explicit: Option<&str>) -> Result<String> {
        if let Some(id) = explicit {
            return Ok(id.to_string());
        }
        self.config_get(DEFAULT_COMPANY_KEY).await?.ok_or_else(|| {
            Error::Config(format!(
                "no company selected. Pass --company or run: salescore config set {DEFAULT_COMPANY_KEY} <ID>"
            ))
        })
    }

    // ── Clients ────────────────────────────────────────────────────

    pub async fn create_client(&self, company_id: &str, input: NewClient) -> Result<Client> {
        let input = NewClient {
            name: require_min_chars("client name", &input.name, 2)?,
            phone: require_min_chars("phone", &input.phone, 6)?,
            ..input
        };
        let company_id = company_id.to_string();
        let now = self.now();
        let client = self
            .db
            .writer()
            .call(move |conn| repository::insert_client(conn, &company_id, &input, &now))
            .await?;
        log::info!("Created client {} in company {}", client.id, client.company_id);
        Ok(client)
    }

    pub async fn get_client(&self, company_id: &str, id: &str) -> Result<Option<Client>> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_client(conn, &company_id, &id))
            .await?)
    }

    pub async fn list_clients(
        &self,
        company_id: &str,
        search: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Client>> {
        let company_id = company_id.to_string();
        let search = search.unwrap_or_default().to_string();
        let limit = limit.clamp(1, query::builder::MAX_LIMIT);
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::list_clients(conn, &company_id, &search, limit, offset))
            .await?)
    }

    pub async fn update_client(
        &self,
        company_id: &str,
        id: &str,
        update: ClientUpdate,
    ) -> Result<Client> {
        let update = ClientUpdate {
            name: update
                .name
                .map(|n| require_min_chars("client name", &n, 2))
                .transpose()?,
            phone: update
                .phone
                .map(|p| require_min_chars("phone", &p, 6))
                .transpose()?,
            ..update
        };
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("client {id}"));
        self.db
            .writer()
            .call(move |conn| repository::update_client(conn, &company_id, &id, &update))
            .await?
            .ok_or(not_found)
    }

    pub async fn delete_client(&self, company_id: &str, id: &str) -> Result<()> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("client {id}"));
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_client(conn, &company_id, &id))
            .await?;
        if !deleted {
            return Err(not_found);
        }
        Ok(())
    }

    // ── Deals ──────────────────────────────────────────────────────

    /// Create a deal for one of the tenant's clients.
    pub async fn create_deal(&self, company_id: &str, input: NewDeal) -> Result<Deal> {
        let input = NewDeal {
            title: require_min_chars("deal title", &input.title, 2)?,
            value: require_non_negative(input.value)?,
            close_date: input.close_date.as_deref().map(normalize_date).transpose()?,
            ..input
        };
        let company_id = company_id.to_string();
        let now = self.now();
        let client_id = input.client_id.clone();
        let deal = self
            .db
            .writer()
            .call(move |conn| {
                if !repository::related_exists(conn, &company_id, RelatedType::Client, &input.client_id)? {
                    return Ok::<_, rusqlite::Error>(None);
                }
                repository::insert_deal(conn, &company_id, &input, &now).map(Some)
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("client {client_id}")))?;
        log::info!("Created deal {} ({}) in company {}", deal.id, deal.stage, deal.company_id);
        Ok(deal)
    }

    pub async fn get_deal(&self, company_id: &str, id: &str) -> Result<Option<Deal>> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_deal(conn, &company_id, &id))
            .await?)
    }

    /// Run a deal listing. The query carries its own tenant.
    pub async fn list_deals(&self, query: DealQuery) -> Result<Page<Deal>> {
        query.deals(&self.db).await
    }

    pub async fn update_deal(&self, company_id: &str, id: &str, update: DealUpdate) -> Result<Deal> {
        let update = DealUpdate {
            title: update
                .title
                .map(|t| require_min_chars("deal title", &t, 2))
                .transpose()?,
            value: update.value.map(require_non_negative).transpose()?,
            close_date: match update.close_date {
                Some(Some(date)) => Some(Some(normalize_date(&date)?)),
                other => other,
            },
            ..update
        };
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("deal {id}"));
        let client_not_found = update
            .client_id
            .as_ref()
            .map(|c| Error::NotFound(format!("client {c}")));
        let outcome = self
            .db
            .writer()
            .call(move |conn| {
                if let Some(ref client_id) = update.client_id {
                    if !repository::related_exists(conn, &company_id, RelatedType::Client, client_id)? {
                        return Ok::<_, rusqlite::Error>(Err(()));
                    }
                }
                repository::update_deal(conn, &company_id, &id, &update).map(Ok)
            })
            .await?;
        match outcome {
            Ok(Some(deal)) => Ok(deal),
            Ok(None) => Err(not_found),
            Err(()) => Err(client_not_found.unwrap_or(not_found)),
        }
    }

    /// Move a deal to another pipeline stage.
    pub async fn update_deal_stage(
        &self,
        company_id: &str,
        id: &str,
        stage: DealStage,
    ) -> Result<Deal> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("deal {id}"));
        let deal = self
            .db
            .writer()
            .call(move |conn| repository::update_deal_stage(conn, &company_id, &id, stage))
            .await?
            .ok_or(not_found)?;
        log::info!("Deal {} moved to {}", deal.id, deal.stage);
        Ok(deal)
    }

    pub async fn delete_deal(&self, company_id: &str, id: &str) -> Result<()> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("deal {id}"));
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_deal(conn, &company_id, &id))
            .await?;
        if !deleted {
            return Err(not_found);
        }
        Ok(())
    }

    /// Every stage of the pipeline with its deals, newest first. Stages
    /// without deals map to an empty list.
    pub async fn deals_grouped_by_stage(
        &self,
        company_id: &str,
    ) -> Result<BTreeMap<DealStage, Vec<Deal>>> {
        let company_id = company_id.to_string();
        let deals = self
            .db
            .reader()
            .call(move |conn| repository::list_all_deals(conn, &company_id))
            .await?;

        let mut board: BTreeMap<DealStage, Vec<Deal>> =
            DealStage::ALL.iter().map(|s| (*s, Vec::new())).collect();
        for deal in deals {
            board.entry(deal.stage).or_default().push(deal);
        }
        Ok(board)
    }

    // ── Tasks ──────────────────────────────────────────────────────

    pub async fn create_task(&self, company_id: &str, input: NewTask) -> Result<Task> {
        let input = NewTask {
            title: require_min_chars("task title", &input.title, 1)?,
            due_date: normalize_date(&input.due_date)?,
            ..input
        };
        let company_id = company_id.to_string();
        let now = self.now();
        let not_found = Error::NotFound(format!(
            "{} {}",
            input.related_type.as_str().to_lowercase(),
            input.related_id
        ));
        let task = self
            .db
            .writer()
            .call(move |conn| {
                if !repository::related_exists(conn, &company_id, input.related_type, &input.related_id)? {
                    return Ok::<_, rusqlite::Error>(None);
                }
                repository::insert_task(conn, &company_id, &input, &now).map(Some)
            })
            .await?
            .ok_or(not_found)?;
        log::info!("Created task {} due {}", task.id, task.due_date);
        Ok(task)
    }

    /// Tasks in a due-date bucket relative to the clock's date, optionally
    /// narrowed to one client or deal.
    pub async fn list_tasks(
        &self,
        company_id: &str,
        filter: TaskFilter,
        related: Option<(RelatedType, String)>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Task>> {
        let company_id = company_id.to_string();
        let today = self.today();
        let limit = limit.clamp(1, query::builder::MAX_LIMIT);
        Ok(self
            .db
            .reader()
            .call(move |conn| {
                let related = related.as_ref().map(|(t, id)| (*t, id.as_str()));
                repository::list_tasks(conn, &company_id, filter, related, &today, limit, offset)
            })
            .await?)
    }

    pub async fn set_task_done(&self, company_id: &str, id: &str, done: bool) -> Result<Task> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("task {id}"));
        self.db
            .writer()
            .call(move |conn| repository::set_task_done(conn, &company_id, &id, done))
            .await?
            .ok_or(not_found)
    }

    pub async fn delete_task(&self, company_id: &str, id: &str) -> Result<()> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("task {id}"));
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_task(conn, &company_id, &id))
            .await?;
        if !deleted {
            return Err(not_found);
        }
        Ok(())
    }

    // ── Activities ─────────────────────────────────────────────────

    pub async fn create_activity(&self, company_id: &str, input: NewActivity) -> Result<Activity> {
        if input.content.trim().is_empty() {
            return Err(Error::InvalidInput("activity content is empty".into()));
        }
        let company_id = company_id.to_string();
        let now = self.now();
        let not_found = Error::NotFound(format!(
            "{} {}",
            input.related_type.as_str().to_lowercase(),
            input.related_id
        ));
        self.db
            .writer()
            .call(move |conn| {
                if !repository::related_exists(conn, &company_id, input.related_type, &input.related_id)? {
                    return Ok::<_, rusqlite::Error>(None);
                }
                repository::insert_activity(conn, &company_id, &input, &now).map(Some)
            })
            .await?
            .ok_or(not_found)
    }

    pub async fn list_activities(
        &self,
        company_id: &str,
        related: Option<(RelatedType, String)>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Activity>> {
        let company_id = company_id.to_string();
        let limit = limit.clamp(1, query::builder::MAX_LIMIT);
        Ok(self
            .db
            .reader()
            .call(move |conn| {
                let related = related.as_ref().map(|(t, id)| (*t, id.as_str()));
                repository::list_activities(conn, &company_id, related, limit, offset)
            })
            .await?)
    }

    pub async fn delete_activity(&self, company_id: &str, id: &str) -> Result<()> {
        let (company_id, id) = (company_id.to_string(), id.to_string());
        let not_found = Error::NotFound(format!("activity {id}"));
        let deleted = self
            .db
            .writer()
            .call(move |conn| repository::delete_activity(conn, &company_id, &id))
            .await?;
        if !deleted {
            return Err(not_found);
        }
        Ok(())
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        Ok(self
            .db
            .reader()
            .call(move |conn| repository::get_config(conn, &key))
            .await?)
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .writer()
            .call(move |conn| repository::set_config(conn, &key, &value))
            .await?;
        Ok(())
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await?)
    }
}

// ── Validation ─────────────────────────────────────────────────────

fn require_min_chars(field: &str, value: &str, min: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.chars().count() < min {
        return Err(Error::InvalidInput(format!(
            "{field} must be at least {min} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn require_non_negative(value: f64) -> Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(Error::InvalidInput(format!(
            "deal value must be a non-negative number, got {value}"
        )));
    }
    Ok(value)
}

/// Accept any calendar date form and store it as `YYYY-MM-DD`.
fn normalize_date(s: &str) -> Result<String> {
    parse_calendar_date(s)
        .map(format_date)
        .ok_or_else(|| Error::InvalidInput(format!("invalid date: {s}")))
}
