//! Tenant-scoped aggregation reads. Every query filters on `company_id`
//! and binds window bounds as storage-format timestamps, half-open.

use rusqlite::{params, Connection};

use super::types::{ClientCounts, DealAggregates, RecentDealRow, StageCount};

/// Clients created in each of the two windows, in one pass.
pub fn client_counts(
    conn: &Connection,
    company_id: &str,
    bounds: &[String; 4],
) -> Result<ClientCounts, rusqlite::Error> {
    let [cur_start, cur_end, prev_start, prev_end] = bounds;
    conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN created_at >= ?2 AND created_at < ?3 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN created_at >= ?4 AND created_at < ?5 THEN 1 ELSE 0 END), 0)
         FROM clients
         WHERE company_id = ?1",
        params![company_id, cur_start, cur_end, prev_start, prev_end],
        |row| {
            Ok(ClientCounts {
                current: row.get::<_, i64>(0)? as u64,
                previous: row.get::<_, i64>(1)? as u64,
            })
        },
    )
}

/// Counts, sums and averages over deals created in `[start, end)`.
pub fn deal_aggregates(
    conn: &Connection,
    company_id: &str,
    start: &str,
    end: &str,
) -> Result<DealAggregates, rusqlite::Error> {
    conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN stage NOT IN ('WON', 'LOST') THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN stage = 'WON' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN stage = 'WON' THEN value END), 0.0),
            COALESCE(SUM(CASE WHEN stage NOT IN ('WON', 'LOST') THEN value END), 0.0),
            COALESCE(AVG(value), 0.0),
            COALESCE(AVG(CASE WHEN stage = 'WON' AND close_date IS NOT NULL
                THEN julianday(date(close_date)) - julianday(date(created_at)) END), 0.0)
         FROM deals
         WHERE company_id = ?1 AND created_at >= ?2 AND created_at < ?3",
        params![company_id, start, end],
        |row| {
            Ok(DealAggregates {
                total: row.get::<_, i64>(0)? as u64,
                active: row.get::<_, i64>(1)? as u64,
                won_count: row.get::<_, i64>(2)? as u64,
                won_value_sum: row.get(3)?,
                pipeline_value: row.get(4)?,
                avg_deal_value: row.get(5)?,
                avg_close_days: row.get(6)?,
            })
        },
    )
}

/// Deal count per stage for deals created in `[start, end)`. Stages with no
/// deals produce no row.
pub fn stage_counts(
    conn: &Connection,
    company_id: &str,
    start: &str,
    end: &str,
) -> Result<Vec<StageCount>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT stage, COUNT(*)
         FROM deals
         WHERE company_id = ?1 AND created_at >= ?2 AND created_at < ?3
         GROUP BY stage",
    )?;
    let rows = stmt.query_map(params![company_id, start, end], |row| {
        Ok(StageCount {
            stage: row.get(0)?,
            count: row.get::<_, i64>(1)? as u64,
        })
    })?;
    rows.collect()
}

/// Open tasks for the tenant, regardless of when they were created.
pub fn pending_task_count(conn: &Connection, company_id: &str) -> Result<u64, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE company_id = ?1 AND done = 0",
        [company_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Newest deals in `[start, end)`, with the client's name and the tenant's
/// first-registered user as owner. Empty names come back as `None`.
pub fn recent_deals(
    conn: &Connection,
    company_id: &str,
    start: &str,
    end: &str,
    limit: u32,
) -> Result<Vec<RecentDealRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.title, NULLIF(TRIM(c.name), ''), d.value, d.stage, d.created_at,
            (SELECT NULLIF(TRIM(u.name), '') FROM users u
              WHERE u.company_id = d.company_id
              ORDER BY u.created_at ASC, u.id ASC
              LIMIT 1)
         FROM deals d
         LEFT JOIN clients c ON c.id = d.client_id AND c.company_id = d.company_id
         WHERE d.company_id = ?1 AND d.created_at >= ?2 AND d.created_at < ?3
         ORDER BY d.created_at DESC, d.id DESC
         LIMIT ?4",
    )?;
    let rows = stmt.query_map(params![company_id, start, end, limit as i64], |row| {
        Ok(RecentDealRow {
            id: row.get(0)?,
            title: row.get(1)?,
            client_name: row.get(2)?,
            value: row.get(3)?,
            stage: row.get(4)?,
            created_at: row.get(5)?,
            owner_name: row.get(6)?,
        })
    })?;
    rows.collect()
}
