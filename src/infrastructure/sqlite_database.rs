use async_trait::async_trait;
use serde_json::Value;
use sqlx::{
    sqlite::{Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow},
    QueryBuilder, Row,
};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::cache::Cache;
use crate::infrastructure::database::{
    validate_field_path, Collection, DocumentDatabase, FindQuery, UnwindQuery, UnwoundRow,
};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{apply_update, Update, UpdateOutcome};

type CacheKey = (Collection, DocId);

/// SQLite-backed document store. One row per document; the JSON payload lives in `data`.
pub struct SqliteDocumentDatabase {
    pool: SqlitePool,
    cache: Mutex<Cache<CacheKey, Value>>,
}

impl SqliteDocumentDatabase {
    pub async fn connect(url: &str, max_connections: u32, cache_capacity: usize) -> AppResult<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| {
                AppError::ConfigurationError(format!("Invalid database URL '{}': {}", url, e))
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if in_memory {
            // Each connection to sqlite::memory: is its own database, so pin exactly one.
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            if let Some(parent) = database_file(url).and_then(|path| path.parent().map(|p| p.to_path_buf())) {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(&parent).await.map_err(|e| {
                        AppError::ConfigurationError(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
            options = options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to connect to SQLite at {}: {}", url, e))
        })?;

        let db = Self {
            pool,
            cache: Mutex::new(Cache::new(cache_capacity)),
        };
        db.initialize().await?;
        info!("Document store ready at {}", url);
        Ok(db)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:", 1, 256).await
    }

    /// Create the documents table and its indexes.
    pub async fn initialize(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                created INTEGER NOT NULL,
                updated INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create documents table: {}", e)))?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_documents_collection_created ON documents(collection, created)",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_phone ON documents(json_extract(data, '$.phone')) WHERE collection = 'users'",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_daily_services_phone ON documents(json_extract(data, '$.phone')) WHERE collection = 'daily_services'",
        ];
        for statement in indexes {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to create index: {}", e)))?;
        }

        Ok(())
    }

    async fn cache_put(&self, collection: Collection, id: &DocId, version: i64, document: &Value) {
        self.cache
            .lock()
            .await
            .insert((collection, id.clone()), version.max(0) as u64, document.clone());
    }
}

#[async_trait]
impl DocumentDatabase for SqliteDocumentDatabase {
    async fn get(&self, collection: Collection, id: &DocId) -> AppResult<Option<Value>> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(document) = cache.get(&(collection, id.clone())) {
                return Ok(Some(document));
            }
        }

        let row = sqlx::query("SELECT data, version FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get {} {}: {}", collection, id, e))
            })?;

        match row {
            Some(row) => {
                let document = parse_json(&row, "data")?;
                let version: i64 = row.get("version");
                self.cache_put(collection, id, version, &document).await;
                Ok(Some(document))
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, collection: Collection, id: &DocId, document: Value) -> AppResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let data = serde_json::to_string(&document)
            .map_err(|e| AppError::SerializationError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO documents (collection, id, data, created, updated, version) VALUES (?, ?, ?, ?, ?, 1)",
        )
        .bind(collection.as_str())
        .bind(id.as_str())
        .bind(data)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.cache
            .lock()
            .await
            .replace((collection, id.clone()), 1, document.clone());
        debug!("Inserted {} {}", collection, id);
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &DocId,
        update: &Update,
    ) -> AppResult<UpdateOutcome> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before reading so concurrent writers queue on busy_timeout
        // instead of failing a read-to-write lock upgrade.
        sqlx::query("UPDATE documents SET version = version WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT data, version FROM documents WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(UpdateOutcome::unmatched(None));
        };

        let mut document = parse_json(&row, "data")?;
        let version: i64 = row.get("version");

        let modified = match apply_update(&mut document, update)? {
            Some(modified) => modified,
            None => {
                tx.rollback().await?;
                return Ok(UpdateOutcome::unmatched(Some(document)));
            }
        };

        if modified == 0 {
            tx.rollback().await?;
            return Ok(UpdateOutcome {
                matched: true,
                modified: 0,
                document: Some(document),
            });
        }

        let data = serde_json::to_string(&document)
            .map_err(|e| AppError::SerializationError(e.to_string()))?;
        let next_version = version + 1;
        sqlx::query(
            "UPDATE documents SET data = ?, updated = ?, version = ? WHERE collection = ? AND id = ?",
        )
        .bind(data)
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(next_version)
        .bind(collection.as_str())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.cache_put(collection, id, next_version, &document).await;

        Ok(UpdateOutcome {
            matched: true,
            modified,
            document: Some(document),
        })
    }

    async fn delete(&self, collection: Collection, id: &DocId) -> AppResult<bool> {
        let row = sqlx::query(
            "DELETE FROM documents WHERE collection = ? AND id = ? RETURNING version",
        )
        .bind(collection.as_str())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let version: i64 = row.get("version");
        self.cache
            .lock()
            .await
            .invalidate((collection, id.clone()), version.max(0) as u64);
        debug!("Deleted {} {}", collection, id);
        Ok(true)
    }

    async fn find(&self, query: &FindQuery) -> AppResult<Vec<Value>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT data FROM documents WHERE collection = ");
        qb.push_bind(query.collection.as_str());
        push_filters(&mut qb, query)?;

        match &query.sort {
            Some(sort) => {
                qb.push(format!(
                    " ORDER BY json_extract(data, '$.{}') {}, id ASC",
                    validate_field_path(&sort.field)?,
                    if sort.descending { "DESC" } else { "ASC" }
                ));
            }
            None => {
                qb.push(" ORDER BY created ASC, id ASC");
            }
        }
        push_page(&mut qb, query.skip, query.limit);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to query {}: {}", query.collection, e))
        })?;

        rows.iter().map(|row| parse_json(row, "data")).collect()
    }

    async fn count(&self, query: &FindQuery) -> AppResult<u64> {
        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM documents WHERE collection = ");
        qb.push_bind(query.collection.as_str());
        push_filters(&mut qb, query)?;

        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("total").max(0) as u64)
    }

    async fn unwind(&self, query: &UnwindQuery) -> AppResult<Vec<UnwoundRow>> {
        if query.sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT collection, document_id, document, element FROM (",
        );
        push_union(&mut qb, query)?;
        qb.push(format!(
            ") ORDER BY sort_key {}, document_id ASC",
            if query.descending { "DESC" } else { "ASC" }
        ));
        push_page(&mut qb, query.skip, query.limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to unwind documents: {}", e)))?;

        rows.iter()
            .map(|row| {
                let collection: String = row.get("collection");
                let document_id: String = row.get("document_id");
                Ok(UnwoundRow {
                    collection: Collection::parse(&collection).ok_or_else(|| {
                        AppError::Internal(format!("Unknown collection '{}'", collection))
                    })?,
                    document_id: DocId::parse(&document_id)?,
                    document: parse_json(row, "document")?,
                    element: parse_json(row, "element")?,
                })
            })
            .collect()
    }

    async fn count_unwound(&self, query: &UnwindQuery) -> AppResult<u64> {
        if query.sources.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM (");
        push_union(&mut qb, query)?;
        qb.push(")");

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to count documents: {}", e)))?;
        Ok(row.get::<i64, _>("total").max(0) as u64)
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }
}

fn parse_json(row: &SqliteRow, column: &str) -> AppResult<Value> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| AppError::DatabaseError(format!("Failed to read column {}: {}", column, e)))?;
    serde_json::from_str(&raw).map_err(AppError::from)
}

fn push_condition(
    qb: &mut QueryBuilder<'_, Sqlite>,
    source: &str,
    field: &str,
    value: &Value,
) -> AppResult<()> {
    let field = validate_field_path(field)?;
    qb.push(format!("json_extract({}, '$.{}')", source, field));
    push_comparison(qb, field, value)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &FindQuery) -> AppResult<()> {
    for (field, value) in &query.equals {
        qb.push(" AND ");
        push_condition(qb, "data", field, value)?;
    }
    for (field, value) in &query.members {
        qb.push(format!(
            " AND EXISTS (SELECT 1 FROM json_each(data, '$.{}') AS member WHERE member.value",
            validate_field_path(field)?
        ));
        push_comparison(qb, field, value)?;
        qb.push(")");
    }
    Ok(())
}

fn push_comparison(qb: &mut QueryBuilder<'_, Sqlite>, field: &str, value: &Value) -> AppResult<()> {
    match value {
        Value::Null => {
            qb.push(" IS NULL");
        }
        Value::Bool(flag) => {
            qb.push(" = ");
            qb.push_bind(*flag as i64);
        }
        Value::Number(number) => {
            qb.push(" = ");
            match number.as_i64() {
                Some(int) => qb.push_bind(int),
                None => qb.push_bind(number.as_f64().unwrap_or_default()),
            };
        }
        Value::String(text) => {
            qb.push(" = ");
            qb.push_bind(text.clone());
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(AppError::Internal(format!(
                "Cannot compare '{}' against a non-scalar value",
                field
            )))
        }
    }
    Ok(())
}

fn push_union(qb: &mut QueryBuilder<'_, Sqlite>, query: &UnwindQuery) -> AppResult<()> {
    for (index, source) in query.sources.iter().enumerate() {
        if index > 0 {
            qb.push(" UNION ALL ");
        }
        qb.push(format!(
            "SELECT d.collection AS collection, d.id AS document_id, d.data AS document, \
             e.value AS element, json_extract(e.value, '$.{}') AS sort_key \
             FROM documents AS d, json_each(d.data, '$.{}') AS e WHERE d.collection = ",
            validate_field_path(&source.sort_field)?,
            validate_field_path(&source.array)?,
        ));
        qb.push_bind(source.collection.as_str());

        for (field, value) in &source.document_equals {
            qb.push(" AND ");
            push_condition(qb, "d.data", field, value)?;
        }
        for (field, value) in &source.element_equals {
            qb.push(" AND ");
            push_condition(qb, "e.value", field, value)?;
        }
        if let Some(range) = &query.range {
            qb.push(format!(
                " AND json_extract(e.value, '$.{}') BETWEEN ",
                validate_field_path(&range.field)?
            ));
            qb.push_bind(range.from);
            qb.push(" AND ");
            qb.push_bind(range.to);
        }
    }
    Ok(())
}

fn push_page(qb: &mut QueryBuilder<'_, Sqlite>, skip: u64, limit: Option<u64>) {
    match limit {
        Some(limit) => {
            qb.push(" LIMIT ");
            qb.push_bind(limit.min(i64::MAX as u64) as i64);
            qb.push(" OFFSET ");
            qb.push_bind(skip.min(i64::MAX as u64) as i64);
        }
        None if skip > 0 => {
            qb.push(" LIMIT -1 OFFSET ");
            qb.push_bind(skip.min(i64::MAX as u64) as i64);
        }
        None => {}
    }
}

fn database_file(url: &str) -> Option<std::path::PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        None
    } else {
        Some(std::path::PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::UnwindSource;
    use crate::infrastructure::id_generator::IdGenerator;
    use crate::infrastructure::update::ElementFilter;
    use serde_json::json;

    async fn seeded() -> (SqliteDocumentDatabase, IdGenerator) {
        let db = SqliteDocumentDatabase::new_in_memory().await.unwrap();
        (db, IdGenerator::new())
    }

    #[tokio::test]
    async fn test_insert_get_update_delete() {
        let (db, ids) = seeded().await;
        let id = ids.next_id();
        db.insert(Collection::Feeds, &id, json!({"id": id, "likes": []}))
            .await
            .unwrap();

        let outcome = db
            .update(
                Collection::Feeds,
                &id,
                &Update::new().toggle_member("likes", "u1"),
            )
            .await
            .unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.modified, 1);

        let stored = db.get(Collection::Feeds, &id).await.unwrap().unwrap();
        assert_eq!(stored["likes"], json!(["u1"]));

        assert!(db.delete(Collection::Feeds, &id).await.unwrap());
        assert!(db.get(Collection::Feeds, &id).await.unwrap().is_none());
        assert!(!db.delete(Collection::Feeds, &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_missing_document_is_unmatched() {
        let (db, ids) = seeded().await;
        let outcome = db
            .update(Collection::Feeds, &ids.next_id(), &Update::new().set("title", "x"))
            .await
            .unwrap();
        assert!(!outcome.matched);
        assert!(outcome.document.is_none());
    }

    #[tokio::test]
    async fn test_guard_failure_is_not_persisted() {
        let (db, ids) = seeded().await;
        let id = ids.next_id();
        db.insert(Collection::Businesses, &id, json!({"report": [{"userId": "u1"}]}))
            .await
            .unwrap();

        let outcome = db
            .update(
                Collection::Businesses,
                &id,
                &Update::new()
                    .when_lacks("report", ElementFilter::eq("userId", "u1"))
                    .push("report", json!({"userId": "u1"})),
            )
            .await
            .unwrap();
        assert!(!outcome.matched);

        let stored = db.get(Collection::Businesses, &id).await.unwrap().unwrap();
        assert_eq!(stored["report"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_filters_sorts_and_pages() {
        let (db, ids) = seeded().await;
        for (n, society) in [(1, "s1"), (2, "s2"), (3, "s1"), (4, "s1")] {
            let id = ids.next_id();
            db.insert(
                Collection::Feeds,
                &id,
                json!({"id": id, "societyId": society, "createdAt": n, "type": "post"}),
            )
            .await
            .unwrap();
        }

        let query = FindQuery::new(Collection::Feeds)
            .eq("societyId", "s1")
            .sort_desc("createdAt");
        let docs = db.find(&query).await.unwrap();
        let order: Vec<i64> = docs.iter().map(|d| d["createdAt"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![4, 3, 1]);
        assert_eq!(db.count(&query).await.unwrap(), 3);

        let paged = db.find(&query.clone().page(1, 1)).await.unwrap();
        assert_eq!(paged[0]["createdAt"], 3);
    }

    #[tokio::test]
    async fn test_unwind_unions_collections() {
        let (db, ids) = seeded().await;
        let deal = ids.next_id();
        let event = ids.next_id();
        db.insert(
            Collection::WholesaleDeals,
            &deal,
            json!({"orders": [
                {"userId": "u1", "orderedAt": 10},
                {"userId": "u2", "orderedAt": 30}
            ]}),
        )
        .await
        .unwrap();
        db.insert(
            Collection::Feeds,
            &event,
            json!({"type": "event", "rsvps": [{"userId": "u1", "registeredAt": 20}]}),
        )
        .await
        .unwrap();

        let query = UnwindQuery::new(vec![
            UnwindSource::new(Collection::WholesaleDeals, "orders", "orderedAt")
                .where_element("userId", "u1"),
            UnwindSource::new(Collection::Feeds, "rsvps", "registeredAt")
                .where_document("type", "event")
                .where_element("userId", "u1"),
        ]);

        let rows = db.unwind(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].collection, Collection::Feeds);
        assert_eq!(rows[0].document_id, event);
        assert_eq!(rows[1].element["orderedAt"], 10);
        assert_eq!(db.count_unwound(&query).await.unwrap(), 2);

        let ranged = query.clone().within("orderedAt", 0, 15);
        assert_eq!(db.count_unwound(&ranged).await.unwrap(), 1);

        let paged = db.unwind(&query.page(1, 5)).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].collection, Collection::WholesaleDeals);
    }

    #[tokio::test]
    async fn test_read_racing_a_delete_is_not_cached() {
        let (db, ids) = seeded().await;
        let id = ids.next_id();
        db.insert(Collection::Societies, &id, json!({"name": "Green Acres"}))
            .await
            .unwrap();
        db.update(Collection::Societies, &id, &Update::new().set("name", "Palm Grove"))
            .await
            .unwrap();

        // A reader fetched version 2 just before the delete committed and writes it back after.
        let stale = json!({"name": "Palm Grove"});
        assert!(db.delete(Collection::Societies, &id).await.unwrap());
        db.cache_put(Collection::Societies, &id, 2, &stale).await;

        assert_eq!(db.get(Collection::Societies, &id).await.unwrap(), None);
        assert!(!db.delete(Collection::Societies, &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_member_filter_matches_array_elements() {
        let (db, ids) = seeded().await;
        for (phone, roles) in [
            ("+911111111111", json!(["resident"])),
            ("+912222222222", json!(["guest", "resident"])),
            ("+913333333333", json!(["guest"])),
        ] {
            db.insert(
                Collection::Users,
                &ids.next_id(),
                json!({"phone": phone, "roles": roles, "societyId": "s1"}),
            )
            .await
            .unwrap();
        }

        let residents = FindQuery::new(Collection::Users).has_member("roles", "resident");
        assert_eq!(db.count(&residents).await.unwrap(), 2);
        assert_eq!(db.find(&residents).await.unwrap().len(), 2);

        let scoped = residents.eq("societyId", "s2");
        assert_eq!(db.count(&scoped).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unique_phone_index() {
        let (db, ids) = seeded().await;
        db.insert(Collection::Users, &ids.next_id(), json!({"phone": "+911234567890"}))
            .await
            .unwrap();
        let err = db
            .insert(Collection::Users, &ids.next_id(), json!({"phone": "+911234567890"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_documents_persist_across_reconnects() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("nested/store.db").display());
        let id = IdGenerator::new().next_id();

        {
            let db = SqliteDocumentDatabase::connect(&url, 2, 16).await.unwrap();
            db.insert(Collection::Societies, &id, json!({"name": "Green Acres"}))
                .await
                .unwrap();
        }

        let reopened = SqliteDocumentDatabase::connect(&url, 2, 16).await.unwrap();
        let stored = reopened.get(Collection::Societies, &id).await.unwrap().unwrap();
        assert_eq!(stored["name"], "Green Acres");
        reopened.health_check().await.unwrap();
    }

    #[test]
    fn test_database_file_parsing() {
        assert_eq!(
            database_file("sqlite:data/society_hub.db"),
            Some(std::path::PathBuf::from("data/society_hub.db"))
        );
        assert_eq!(
            database_file("sqlite:///tmp/x.db?mode=rwc"),
            Some(std::path::PathBuf::from("/tmp/x.db"))
        );
        assert_eq!(database_file("postgres://x"), None);
    }
}
