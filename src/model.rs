use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Declares an enum persisted as its upper-case name in a TEXT column.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "unknown {}: {other}",
                        stringify!($name)
                    ))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum! {
    /// Pipeline position of a deal, in pipeline order.
    DealStage {
        New => "NEW",
        Contacted => "CONTACTED",
        QuoteSent => "QUOTE_SENT",
        Waiting => "WAITING",
        Won => "WON",
        Lost => "LOST",
    }
}

impl DealStage {
    /// WON and LOST are terminal; everything else is still in play.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DealStage::Won | DealStage::Lost)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

text_enum! {
    /// Kind of entity a task or activity hangs off.
    RelatedType {
        Client => "CLIENT",
        Deal => "DEAL",
    }
}

text_enum! {
    ActivityType {
        Note => "NOTE",
        Call => "CALL",
        Whatsapp => "WHATSAPP",
        Meeting => "MEETING",
    }
}

text_enum! {
    UserRole {
        Admin => "ADMIN",
        Agent => "AGENT",
    }
}

/// A tenant.
#[derive(Debug, Clone, Serialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub notes: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl ClientUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.phone.is_none() && self.email.is_none() && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Deal {
    pub id: String,
    pub company_id: String,
    /// `None` once the client has been deleted.
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    pub title: String,
    pub value: f64,
    pub stage: DealStage,
    pub close_date: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewDeal {
    pub client_id: String,
    pub title: String,
    pub value: f64,
    pub stage: DealStage,
    pub close_date: Option<String>,
}

impl NewDeal {
    pub fn new(client_id: &str, title: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            title: title.to_string(),
            value: 0.0,
            stage: DealStage::New,
            close_date: None,
        }
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn stage(mut self, stage: DealStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn close_date(mut self, date: &str) -> Self {
        self.close_date = Some(date.to_string());
        self
    }
}

/// Partial update. `close_date: Some(None)` clears the close date.
#[derive(Debug, Clone, Default)]
pub struct DealUpdate {
    pub client_id: Option<String>,
    pub title: Option<String>,
    pub value: Option<f64>,
    pub stage: Option<DealStage>,
    pub close_date: Option<Option<String>>,
}

impl DealUpdate {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.title.is_none()
            && self.value.is_none()
            && self.stage.is_none()
            && self.close_date.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub company_id: String,
    pub related_type: RelatedType,
    pub related_id: String,
    pub title: String,
    pub due_date: String,
    pub done: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub related_type: RelatedType,
    pub related_id: String,
    pub title: String,
    pub due_date: String,
}

/// Due-date buckets for task listings. Everything but `All` skips done tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskFilter {
    Today,
    Overdue,
    Upcoming,
    #[default]
    All,
}

impl FromStr for TaskFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(TaskFilter::Today),
            "overdue" => Ok(TaskFilter::Overdue),
            "upcoming" => Ok(TaskFilter::Upcoming),
            "all" => Ok(TaskFilter::All),
            other => Err(Error::InvalidInput(format!("unknown task filter: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: String,
    pub company_id: String,
    pub related_type: RelatedType,
    pub related_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityType,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub related_type: RelatedType,
    pub related_id: String,
    pub kind: ActivityType,
    pub content: String,
}

/// One page of a listing plus the unpaged total.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deal_stage_round_trip_text() {
        for stage in DealStage::ALL {
            assert_eq!(stage.as_str().parse::<DealStage>().unwrap(), *stage);
        }
        assert_eq!("quote_sent".parse::<DealStage>().unwrap(), DealStage::QuoteSent);
        assert!("ARCHIVED".parse::<DealStage>().is_err());
    }

    #[test]
    fn test_deal_stage_terminal() {
        assert!(DealStage::Won.is_terminal());
        assert!(DealStage::Lost.is_terminal());
        assert!(DealStage::New.is_active());
        assert!(DealStage::Waiting.is_active());
    }

    #[test]
    fn test_deal_stage_pipeline_order() {
        let mut stages = vec![DealStage::Lost, DealStage::New, DealStage::Won, DealStage::Contacted];
        stages.sort();
        assert_eq!(
            stages,
            vec![DealStage::New, DealStage::Contacted, DealStage::Won, DealStage::Lost]
        );
    }

    #[test]
    fn test_serialize_enums_as_upper_case() {
        assert_eq!(serde_json::to_string(&DealStage::QuoteSent).unwrap(), "\"QUOTE_SENT\"");
        assert_eq!(serde_json::to_string(&ActivityType::Whatsapp).unwrap(), "\"WHATSAPP\"");
    }

    #[test]
    fn test_task_filter_parse() {
        assert_eq!("Overdue".parse::<TaskFilter>().unwrap(), TaskFilter::Overdue);
        assert!("later".parse::<TaskFilter>().is_err());
    }

    #[test]
    fn test_sql_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let stage: DealStage = conn
            .query_row("SELECT ?1", [DealStage::Waiting], |row| row.get(0))
            .unwrap();
        assert_eq!(stage, DealStage::Waiting);

        let bad: rusqlite::Result<DealStage> =
            conn.query_row("SELECT 'ARCHIVED'", [], |row| row.get(0));
        assert!(bad.is_err());
    }
}
