// Owns every write to `User.orders`. Nothing else touches the pointer list.

use serde_json::Value;
use tracing::{debug, warn};

use crate::entities::EntityStore;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{ElementFilter, Update};
use crate::models::common::{OrderPointer, SourceType, SubOrder};

#[derive(Clone)]
pub struct PointerSync {
    store: EntityStore,
}

impl PointerSync {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Set the pointer for (sourceType, sourceId) if the user has one, otherwise append it.
    pub async fn upsert(&self, user_id: &DocId, pointer: &OrderPointer) -> AppResult<()> {
        let filter = pointer_filter(pointer.source_type, &pointer.source_id);
        let db = self.store.database();

        // A concurrent push can land between the two steps; one more pass then finds it.
        for _ in 0..2 {
            let set = Update::new()
                .when_contains("orders", filter.clone())
                .set_element("orders", filter.clone(), "quantity", pointer.quantity)
                .set_element("orders", filter.clone(), "amount", pointer.amount)
                .set_element("orders", filter.clone(), "status", serde_json::to_value(pointer.status)?)
                .set_element(
                    "orders",
                    filter.clone(),
                    "orderId",
                    pointer.order_id.as_ref().map(|id| Value::from(id.as_str())),
                )
                .set_element(
                    "orders",
                    filter.clone(),
                    "updatedAt",
                    pointer.updated_at.timestamp_millis(),
                );
            let outcome = db.update(Collection::Users, user_id, &set).await?;
            if outcome.matched {
                return Ok(());
            }
            if outcome.document.is_none() {
                return Err(AppError::NotFound("User not found".to_string()));
            }

            let push = Update::new()
                .when_lacks("orders", filter.clone())
                .push("orders", serde_json::to_value(pointer)?);
            if db.update(Collection::Users, user_id, &push).await?.matched {
                return Ok(());
            }
        }

        Err(AppError::Internal(format!(
            "Could not settle {} pointer {} for user {}",
            pointer.source_type.as_str(),
            pointer.source_id,
            user_id
        )))
    }

    pub async fn remove(
        &self,
        user_id: &DocId,
        source_type: SourceType,
        source_id: &DocId,
    ) -> AppResult<()> {
        let pull = Update::new().pull("orders", pointer_filter(source_type, source_id));
        let outcome = self
            .store
            .database()
            .update(Collection::Users, user_id, &pull)
            .await?;
        if outcome.document.is_none() {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    /// The source document is authoritative; a failed pointer write is logged and dropped.
    pub async fn upsert_best_effort(&self, user_id: &DocId, pointer: &OrderPointer) {
        match self.upsert(user_id, pointer).await {
            Ok(()) => debug!(
                "Synced {} pointer {} for user {}",
                pointer.source_type.as_str(),
                pointer.source_id,
                user_id
            ),
            Err(e) => warn!(
                "Failed to sync {} pointer {} for user {}: {}",
                pointer.source_type.as_str(),
                pointer.source_id,
                user_id,
                e
            ),
        }
    }

    /// Re-sync the pointer of every buyer of a source, after its sub-orders changed wholesale.
    pub async fn sync_sub_orders(
        &self,
        source_type: SourceType,
        source_id: &DocId,
        orders: &[SubOrder],
    ) {
        for order in orders {
            let pointer = OrderPointer::for_sub_order(source_type, source_id, order);
            self.upsert_best_effort(&order.user_id, &pointer).await;
        }
    }

    pub async fn remove_best_effort(
        &self,
        user_id: &DocId,
        source_type: SourceType,
        source_id: &DocId,
    ) {
        if let Err(e) = self.remove(user_id, source_type, source_id).await {
            warn!(
                "Failed to remove {} pointer {} for user {}: {}",
                source_type.as_str(),
                source_id,
                user_id,
                e
            );
        }
    }
}

fn pointer_filter(source_type: SourceType, source_id: &DocId) -> ElementFilter {
    ElementFilter::eq("sourceType", source_type.as_str()).and("sourceId", source_id.as_str())
}
