use crate::error::Result;
use crate::model::{Deal, DealStage, Page};
use crate::storage::repository::{deal_from_row, DEAL_SELECT};
use crate::storage::Database;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 100;

/// Builder for deal listings. Always scoped to one tenant.
#[derive(Debug, Clone)]
pub struct DealQuery {
    company_id: String,
    stage: Option<DealStage>,
    client_id: Option<String>,
    limit: u32,
    offset: u32,
}

impl DealQuery {
    pub fn new(company_id: &str) -> Self {
        Self {
            company_id: company_id.to_string(),
            stage: None,
            client_id: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn stage(mut self, stage: DealStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn client(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    /// Page size, clamped to `1..=100`.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = n.clamp(1, MAX_LIMIT);
        self
    }

    pub fn offset(mut self, n: u32) -> Self {
        self.offset = n;
        self
    }

    /// Execute the query, returning the requested page and the total match count.
    pub async fn deals(self, db: &Database) -> Result<Page<Deal>> {
        let builder = self;
        let page = db
            .reader()
            .call(move |conn| {
                let (where_clause, mut params) = builder.build_filter();

                let count_sql = format!("SELECT COUNT(*) FROM deals d WHERE {where_clause}");
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let total: i64 = conn.query_row(&count_sql, param_refs.as_slice(), |row| row.get(0))?;

                let idx = params.len() + 1;
                let sql = format!(
                    "{DEAL_SELECT} WHERE {where_clause} ORDER BY d.created_at DESC, d.id LIMIT ?{} OFFSET ?{}",
                    idx,
                    idx + 1
                );
                params.push(Box::new(builder.limit as i64));
                params.push(Box::new(builder.offset as i64));
                let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| p.as_ref()).collect();
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(param_refs.as_slice(), deal_from_row)?;
                let items = rows.collect::<std::result::Result<Vec<_>, _>>()?;

                Ok::<Page<Deal>, rusqlite::Error>(Page {
                    items,
                    total: total as u64,
                })
            })
            .await?;
        Ok(page)
    }

    fn build_filter(&self) -> (String, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut wheres = Vec::new();

        wheres.push("d.company_id = ?1".to_string());
        params.push(Box::new(self.company_id.clone()));
        let mut param_idx = 2;

        if let Some(stage) = self.stage {
            wheres.push(format!("d.stage = ?{param_idx}"));
            params.push(Box::new(stage));
            param_idx += 1;
        }

        if let Some(ref client_id) = self.client_id {
            wheres.push(format!("d.client_id = ?{param_idx}"));
            params.push(Box::new(client_id.clone()));
        }

        (wheres.join(" AND "), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewClient, NewDeal};
    use crate::storage::repository;

    #[test]
    fn test_build_filter_default() {
        let (sql, params) = DealQuery::new("acme").build_filter();
        assert_eq!(sql, "d.company_id = ?1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_build_filter_with_filters() {
        let (sql, params) = DealQuery::new("acme")
            .stage(DealStage::Won)
            .client("c1")
            .build_filter();
        assert!(sql.contains("d.stage = ?2"));
        assert!(sql.contains("d.client_id = ?3"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(DealQuery::new("acme").limit(0).limit, 1);
        assert_eq!(DealQuery::new("acme").limit(500).limit, MAX_LIMIT);
        assert_eq!(DealQuery::new("acme").limit, DEFAULT_LIMIT);
    }

    #[tokio::test]
    async fn test_deals_filters_and_pages() {
        let db = Database::open_memory().await.unwrap();

        let (acme, maria) = db
            .writer()
            .call(|conn| {
                let now = "2025-03-01 09:00:00";
                let acme = repository::insert_company(conn, "Acme", now)?.id;
                let globex = repository::insert_company(conn, "Globex", now)?.id;
                let client = |name: &str| NewClient {
                    name: name.to_string(),
                    phone: "5550000".to_string(),
                    ..Default::default()
                };
                let maria = repository::insert_client(conn, &acme, &client("Maria"), now)?.id;
                let pedro = repository::insert_client(conn, &acme, &client("Pedro"), now)?.id;
                let other = repository::insert_client(conn, &globex, &client("Globex Co"), now)?.id;

                repository::insert_deal(conn, &acme, &NewDeal::new(&maria, "A").stage(DealStage::Won), "2025-03-01 10:00:00")?;
                repository::insert_deal(conn, &acme, &NewDeal::new(&maria, "B"), "2025-03-02 10:00:00")?;
                repository::insert_deal(conn, &acme, &NewDeal::new(&pedro, "C"), "2025-03-03 10:00:00")?;
                repository::insert_deal(conn, &globex, &NewDeal::new(&other, "X"), "2025-03-04 10:00:00")?;
                Ok::<_, rusqlite::Error>((acme, maria))
            })
            .await
            .unwrap();

        let all = DealQuery::new(&acme).deals(&db).await.unwrap();
        assert_eq!(all.total, 3);
        assert_eq!(all.items[0].title, "C");
        assert!(all.items.iter().all(|d| d.company_id == acme));

        let won = DealQuery::new(&acme).stage(DealStage::Won).deals(&db).await.unwrap();
        assert_eq!(won.total, 1);
        assert_eq!(won.items[0].title, "A");

        let for_maria = DealQuery::new(&acme).client(&maria).limit(1).deals(&db).await.unwrap();
        assert_eq!(for_maria.total, 2);
        assert_eq!(for_maria.items.len(), 1);
        assert_eq!(for_maria.items[0].title, "B");
        assert_eq!(for_maria.items[0].client_name.as_deref(), Some("Maria"));

        let second = DealQuery::new(&acme).client(&maria).limit(1).offset(1).deals(&db).await.unwrap();
        assert_eq!(second.items[0].title, "A");
    }
}
