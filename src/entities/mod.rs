// Typed access to documents. Models implement Document; services go through EntityStore.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Collection, DocumentDatabase, FindQuery};
use crate::infrastructure::id_generator::{DocId, IdGenerator};
use crate::infrastructure::update::{Update, UpdateOutcome};

/// A model stored as one document in `COLLECTION`.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + Sized {
    const COLLECTION: Collection;
    /// Human-readable name used in error messages.
    const LABEL: &'static str;

    fn id(&self) -> &DocId;

    fn not_found() -> AppError {
        AppError::NotFound(format!("{} not found", Self::LABEL))
    }

    fn query() -> FindQuery {
        FindQuery::new(Self::COLLECTION)
    }
}

#[derive(Clone)]
pub struct EntityStore {
    db: Arc<dyn DocumentDatabase>,
    ids: Arc<IdGenerator>,
}

impl EntityStore {
    pub fn new(db: Arc<dyn DocumentDatabase>, ids: Arc<IdGenerator>) -> Self {
        Self { db, ids }
    }

    pub fn database(&self) -> &Arc<dyn DocumentDatabase> {
        &self.db
    }

    pub fn next_id(&self) -> DocId {
        self.ids.next_id()
    }

    /// Load a document, `None` when absent.
    pub async fn gen_nullable<T: Document>(&self, id: &DocId) -> AppResult<Option<T>> {
        match self.db.get(T::COLLECTION, id).await? {
            Some(document) => Ok(Some(decode(document)?)),
            None => Ok(None),
        }
    }

    /// Load a document, NotFound when absent.
    pub async fn gen_enforce<T: Document>(&self, id: &DocId) -> AppResult<T> {
        self.gen_nullable(id).await?.ok_or_else(T::not_found)
    }

    pub async fn exists<T: Document>(&self, id: &DocId) -> AppResult<bool> {
        Ok(self.db.get(T::COLLECTION, id).await?.is_some())
    }

    pub async fn create<T: Document>(&self, entity: &T) -> AppResult<()> {
        let document = serde_json::to_value(entity)
            .map_err(|e| AppError::SerializationError(e.to_string()))?;
        self.db.insert(T::COLLECTION, entity.id(), document).await
    }

    pub async fn update<T: Document>(&self, id: &DocId, update: &Update) -> AppResult<UpdateOutcome> {
        self.db.update(T::COLLECTION, id, update).await
    }

    /// Apply `update` and return the post-image. NotFound when the document is absent
    /// or the update's guard rejects it.
    pub async fn update_enforce<T: Document>(&self, id: &DocId, update: &Update) -> AppResult<T> {
        let outcome = self.update::<T>(id, update).await?;
        match (outcome.matched, outcome.document) {
            (true, Some(document)) => decode(document),
            _ => Err(T::not_found()),
        }
    }

    pub async fn delete<T: Document>(&self, id: &DocId) -> AppResult<bool> {
        self.db.delete(T::COLLECTION, id).await
    }

    pub async fn gen_all<T: Document>(&self, query: &FindQuery) -> AppResult<Vec<T>> {
        debug_assert_eq!(query.collection, T::COLLECTION);
        self.db
            .find(query)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn count(&self, query: &FindQuery) -> AppResult<u64> {
        self.db.count(query).await
    }
}

pub fn decode<T: DeserializeOwned>(document: Value) -> AppResult<T> {
    serde_json::from_value(document)
        .map_err(|e| AppError::DeserializationError(format!("Stored document is malformed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::sqlite_database::SqliteDocumentDatabase;
    use crate::models::{NewSociety, Society};
    use serde_json::json;

    async fn store() -> EntityStore {
        let db = SqliteDocumentDatabase::new_in_memory().await.unwrap();
        EntityStore::new(Arc::new(db), Arc::new(IdGenerator::new()))
    }

    #[tokio::test]
    async fn test_create_and_load_typed_document() {
        let store = store().await;
        let new: NewSociety = serde_json::from_value(json!({"name": "Lake View"})).unwrap();
        let society = new.into_society(store.next_id(), crate::models::common::now()).unwrap();
        store.create(&society).await.unwrap();

        let loaded: Society = store.gen_enforce(&society.id).await.unwrap();
        assert_eq!(loaded, society);
        assert!(store.exists::<Society>(&society.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let store = store().await;
        let err = store.gen_enforce::<Society>(&store.next_id()).await.unwrap_err();
        match err {
            AppError::NotFound(message) => assert_eq!(message, "Society not found"),
            other => panic!("unexpected {:?}", other),
        }

        let err = store
            .update_enforce::<Society>(&store.next_id(), &Update::new().set("name", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
