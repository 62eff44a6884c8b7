//! Tenant-scoped row access. Every statement that touches a tenant-owned
//! table filters on `company_id`, including the ones keyed by primary id.

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::{
    Activity, Client, ClientUpdate, Company, Deal, DealStage, DealUpdate, NewActivity,
    NewClient, NewDeal, NewTask, Page, RelatedType, Task, TaskFilter, User, UserRole,
};

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ── Companies ──────────────────────────────────────────────────────

pub fn insert_company(conn: &Connection, name: &str, now: &str) -> Result<Company, rusqlite::Error> {
    let company = Company {
        id: new_id(),
        name: name.to_string(),
        created_at: now.to_string(),
    };
    conn.execute(
        "INSERT INTO companies (id, name, created_at) VALUES (?1, ?2, ?3)",
        params![company.id, company.name, company.created_at],
    )?;
    Ok(company)
}

pub fn get_company(conn: &Connection, id: &str) -> Result<Option<Company>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, name, created_at FROM companies WHERE id = ?1",
        params![id],
        |row| {
            Ok(Company {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()
}

// ── Users ──────────────────────────────────────────────────────────

pub fn insert_user(
    conn: &Connection,
    company_id: &str,
    name: &str,
    email: &str,
    role: UserRole,
    now: &str,
) -> Result<User, rusqlite::Error> {
    let user = User {
        id: new_id(),
        company_id: company_id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        role,
        created_at: now.to_string(),
    };
    conn.execute(
        "INSERT INTO users (id, company_id, name, email, role, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![user.id, user.company_id, user.name, user.email, user.role, user.created_at],
    )?;
    Ok(user)
}

pub fn list_users(conn: &Connection, company_id: &str) -> Result<Vec<User>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, company_id, name, email, role, created_at
         FROM users WHERE company_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![company_id], |row| {
        Ok(User {
            id: row.get(0)?,
            company_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            role: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Clients ────────────────────────────────────────────────────────

const CLIENT_COLUMNS: &str = "id, company_id, name, phone, email, notes, created_at";

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: row.get(0)?,
        company_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn insert_client(
    conn: &Connection,
    company_id: &str,
    input: &NewClient,
    now: &str,
) -> Result<Client, rusqlite::Error> {
    let id = new_id();
    // Blank email is stored as NULL, same as absent.
    let email = input.email.as_deref().filter(|e| !e.trim().is_empty());
    conn.execute(
        "INSERT INTO clients (id, company_id, name, phone, email, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, company_id, input.name, input.phone, email, input.notes, now],
    )?;
    Ok(Client {
        id,
        company_id: company_id.to_string(),
        name: input.name.clone(),
        phone: input.phone.clone(),
        email: email.map(str::to_string),
        notes: input.notes.clone(),
        created_at: now.to_string(),
    })
}

pub fn get_client(
    conn: &Connection,
    company_id: &str,
    id: &str,
) -> Result<Option<Client>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1 AND company_id = ?2"),
        params![id, company_id],
        client_from_row,
    )
    .optional()
}

/// Newest-first page of clients, optionally filtered by a case-insensitive
/// substring of name, phone or email.
pub fn list_clients(
    conn: &Connection,
    company_id: &str,
    search: &str,
    limit: u32,
    offset: u32,
) -> Result<Page<Client>, rusqlite::Error> {
    let pattern = like_pattern(search);
    let filter = "company_id = ?1
         AND (?2 = '%%' OR name LIKE ?2 ESCAPE '\\' OR phone LIKE ?2 ESCAPE '\\' OR email LIKE ?2 ESCAPE '\\')";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM clients WHERE {filter}"),
        params![company_id, pattern],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {CLIENT_COLUMNS} FROM clients WHERE {filter}
         ORDER BY created_at DESC, id LIMIT ?3 OFFSET ?4"
    ))?;
    let rows = stmt.query_map(
        params![company_id, pattern, limit as i64, offset as i64],
        client_from_row,
    )?;
    Ok(Page {
        items: rows.collect::<Result<Vec<_>, _>>()?,
        total: total as u64,
    })
}

pub fn update_client(
    conn: &Connection,
    company_id: &str,
    id: &str,
    update: &ClientUpdate,
) -> Result<Option<Client>, rusqlite::Error> {
    if !update.is_empty() {
        let email = update
            .email
            .as_deref()
            .map(|e| if e.trim().is_empty() { None } else { Some(e) });
        let count = conn.execute(
            "UPDATE clients SET
                name = COALESCE(?3, name),
                phone = COALESCE(?4, phone),
                email = CASE WHEN ?5 THEN ?6 ELSE email END,
                notes = COALESCE(?7, notes)
             WHERE id = ?1 AND company_id = ?2",
            params![
                id,
                company_id,
                update.name,
                update.phone,
                email.is_some(),
                email.flatten(),
                update.notes,
            ],
        )?;
        if count == 0 {
            return Ok(None);
        }
    }
    get_client(conn, company_id, id)
}

pub fn delete_client(conn: &Connection, company_id: &str, id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM clients WHERE id = ?1 AND company_id = ?2",
        params![id, company_id],
    )?;
    Ok(count > 0)
}

// ── Deals ──────────────────────────────────────────────────────────

/// Deal columns plus the client name, joined only within the same tenant.
pub(crate) const DEAL_SELECT: &str = "SELECT d.id, d.company_id, d.client_id, c.name,
        d.title, d.value, d.stage, d.close_date, d.created_at
    FROM deals d
    LEFT JOIN clients c ON c.id = d.client_id AND c.company_id = d.company_id";

pub(crate) fn deal_from_row(row: &Row<'_>) -> rusqlite::Result<Deal> {
    Ok(Deal {
        id: row.get(0)?,
        company_id: row.get(1)?,
        client_id: row.get(2)?,
        client_name: row.get(3)?,
        title: row.get(4)?,
        value: row.get(5)?,
        stage: row.get(6)?,
        close_date: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn insert_deal(
    conn: &Connection,
    company_id: &str,
    input: &NewDeal,
    now: &str,
) -> Result<Deal, rusqlite::Error> {
    let id = new_id();
    conn.execute(
        "INSERT INTO deals (id, company_id, client_id, title, value, stage, close_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            company_id,
            input.client_id,
            input.title,
            input.value,
            input.stage,
            input.close_date,
            now,
        ],
    )?;
    get_deal(conn, company_id, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get_deal(
    conn: &Connection,
    company_id: &str,
    id: &str,
) -> Result<Option<Deal>, rusqlite::Error> {
    conn.query_row(
        &format!("{DEAL_SELECT} WHERE d.id = ?1 AND d.company_id = ?2"),
        params![id, company_id],
        deal_from_row,
    )
    .optional()
}

pub fn update_deal(
    conn: &Connection,
    company_id: &str,
    id: &str,
    update: &DealUpdate,
) -> Result<Option<Deal>, rusqlite::Error> {
    if !update.is_empty() {
        let count = conn.execute(
            "UPDATE deals SET
                client_id = COALESCE(?3, client_id),
                title = COALESCE(?4, title),
                value = COALESCE(?5, value),
                stage = COALESCE(?6, stage),
                close_date = CASE WHEN ?7 THEN ?8 ELSE close_date END
             WHERE id = ?1 AND company_id = ?2",
            params![
                id,
                company_id,
                update.client_id,
                update.title,
                update.value,
                update.stage,
                update.close_date.is_some(),
                update.close_date.clone().flatten(),
            ],
        )?;
        if count == 0 {
            return Ok(None);
        }
    }
    get_deal(conn, company_id, id)
}

pub fn update_deal_stage(
    conn: &Connection,
    company_id: &str,
    id: &str,
    stage: DealStage,
) -> Result<Option<Deal>, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE deals SET stage = ?3 WHERE id = ?1 AND company_id = ?2",
        params![id, company_id, stage],
    )?;
    if count == 0 {
        return Ok(None);
    }
    get_deal(conn, company_id, id)
}

pub fn delete_deal(conn: &Connection, company_id: &str, id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM deals WHERE id = ?1 AND company_id = ?2",
        params![id, company_id],
    )?;
    Ok(count > 0)
}

/// All of a tenant's deals, newest first (the pipeline board).
pub fn list_all_deals(conn: &Connection, company_id: &str) -> Result<Vec<Deal>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "{DEAL_SELECT} WHERE d.company_id = ?1 ORDER BY d.created_at DESC, d.id"
    ))?;
    let rows = stmt.query_map(params![company_id], deal_from_row)?;
    rows.collect()
}

// ── Tasks ──────────────────────────────────────────────────────────

const TASK_COLUMNS: &str = "id, company_id, related_type, related_id, title, due_date, done, created_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        company_id: row.get(1)?,
        related_type: row.get(2)?,
        related_id: row.get(3)?,
        title: row.get(4)?,
        due_date: row.get(5)?,
        done: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub fn insert_task(
    conn: &Connection,
    company_id: &str,
    input: &NewTask,
    now: &str,
) -> Result<Task, rusqlite::Error> {
    let task = Task {
        id: new_id(),
        company_id: company_id.to_string(),
        related_type: input.related_type,
        related_id: input.related_id.clone(),
        title: input.title.clone(),
        due_date: input.due_date.clone(),
        done: false,
        created_at: now.to_string(),
    };
    conn.execute(
        "INSERT INTO tasks (id, company_id, related_type, related_id, title, due_date, done, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        params![
            task.id,
            task.company_id,
            task.related_type,
            task.related_id,
            task.title,
            task.due_date,
            task.created_at,
        ],
    )?;
    Ok(task)
}

pub fn get_task(conn: &Connection, company_id: &str, id: &str) -> Result<Option<Task>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND company_id = ?2"),
        params![id, company_id],
        task_from_row,
    )
    .optional()
}

/// Page of tasks ordered by due date. `today` is the caller's calendar
/// date (`YYYY-MM-DD`) used by the due-date buckets.
pub fn list_tasks(
    conn: &Connection,
    company_id: &str,
    filter: TaskFilter,
    related: Option<(RelatedType, &str)>,
    today: &str,
    limit: u32,
    offset: u32,
) -> Result<Page<Task>, rusqlite::Error> {
    let mut wheres = vec!["company_id = ?"];
    let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(company_id.to_string())];

    let bucket = match filter {
        TaskFilter::Today => Some("date(due_date) = ? AND done = 0"),
        TaskFilter::Overdue => Some("date(due_date) < ? AND done = 0"),
        TaskFilter::Upcoming => Some("date(due_date) > ? AND done = 0"),
        TaskFilter::All => None,
    };
    if let Some(clause) = bucket {
        wheres.push(clause);
        values.push(Box::new(today.to_string()));
    }
    if let Some((related_type, related_id)) = related {
        wheres.push("related_type = ? AND related_id = ?");
        values.push(Box::new(related_type));
        values.push(Box::new(related_id.to_string()));
    }
    let where_clause = wheres.join(" AND ");

    let param_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM tasks WHERE {where_clause}"),
        param_refs.as_slice(),
        |row| row.get(0),
    )?;

    values.push(Box::new(limit as i64));
    values.push(Box::new(offset as i64));
    let param_refs: Vec<&dyn ToSql> = values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE {where_clause}
         ORDER BY due_date ASC, created_at DESC LIMIT ? OFFSET ?"
    ))?;
    let rows = stmt.query_map(param_refs.as_slice(), task_from_row)?;
    Ok(Page {
        items: rows.collect::<Result<Vec<_>, _>>()?,
        total: total as u64,
    })
}

pub fn set_task_done(
    conn: &Connection,
    company_id: &str,
    id: &str,
    done: bool,
) -> Result<Option<Task>, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE tasks SET done = ?3 WHERE id = ?1 AND company_id = ?2",
        params![id, company_id, done],
    )?;
    if count == 0 {
        return Ok(None);
    }
    get_task(conn, company_id, id)
}

pub fn delete_task(conn: &Connection, company_id: &str, id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM tasks WHERE id = ?1 AND company_id = ?2",
        params![id, company_id],
    )?;
    Ok(count > 0)
}

// ── Activities ─────────────────────────────────────────────────────

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        company_id: row.get(1)?,
        related_type: row.get(2)?,
        related_id: row.get(3)?,
        kind: row.get(4)?,
        content: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn insert_activity(
    conn: &Connection,
    company_id: &str,
    input: &NewActivity,
    now: &str,
) -> Result<Activity, rusqlite::Error> {
    let activity = Activity {
        id: new_id(),
        company_id: company_id.to_string(),
        related_type: input.related_type,
        related_id: input.related_id.clone(),
        kind: input.kind,
        content: input.content.clone(),
        created_at: now.to_string(),
    };
    conn.execute(
        "INSERT INTO activities (id, company_id, related_type, related_id, type, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            activity.id,
            activity.company_id,
            activity.related_type,
            activity.related_id,
            activity.kind,
            activity.content,
            activity.created_at,
        ],
    )?;
    Ok(activity)
}

pub fn list_activities(
    conn: &Connection,
    company_id: &str,
    related: Option<(RelatedType, &str)>,
    limit: u32,
    offset: u32,
) -> Result<Page<Activity>, rusqlite::Error> {
    let (related_type, related_id) = match related {
        Some((t, id)) => (Some(t), Some(id)),
        None => (None, None),
    };
    let filter = "company_id = ?1
         AND (?2 IS NULL OR related_type = ?2)
         AND (?3 IS NULL OR related_id = ?3)";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM activities WHERE {filter}"),
        params![company_id, related_type, related_id],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT id, company_id, related_type, related_id, type, content, created_at
         FROM activities WHERE {filter}
         ORDER BY created_at DESC, id LIMIT ?4 OFFSET ?5"
    ))?;
    let rows = stmt.query_map(
        params![company_id, related_type, related_id, limit as i64, offset as i64],
        activity_from_row,
    )?;
    Ok(Page {
        items: rows.collect::<Result<Vec<_>, _>>()?,
        total: total as u64,
    })
}

pub fn delete_activity(conn: &Connection, company_id: &str, id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "DELETE FROM activities WHERE id = ?1 AND company_id = ?2",
        params![id, company_id],
    )?;
    Ok(count > 0)
}

// ── Ownership checks ───────────────────────────────────────────────

/// True if `id` names a client or deal owned by the tenant.
pub fn related_exists(
    conn: &Connection,
    company_id: &str,
    related_type: RelatedType,
    id: &str,
) -> Result<bool, rusqlite::Error> {
    let table = match related_type {
        RelatedType::Client => "clients",
        RelatedType::Deal => "deals",
    };
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1 AND company_id = ?2"),
            params![id, company_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now', 'localtime'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Helpers ────────────────────────────────────────────────────────

/// `%term%` with LIKE wildcards in the term escaped by `\`.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
