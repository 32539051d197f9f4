use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::entities::{Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{now, touch, SourceType};
use crate::models::wholesale_deal::{DealPatchRequest, NewDeal, WholesaleDeal};
use crate::models::Society;
use crate::services::pointer_sync::PointerSync;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirySweep {
    pub expired_count: usize,
    pub deal_ids: Vec<DocId>,
}

#[derive(Clone)]
pub struct DealDirectory {
    store: EntityStore,
    pointers: PointerSync,
}

impl DealDirectory {
    pub fn new(store: EntityStore, pointers: PointerSync) -> Self {
        Self { store, pointers }
    }

    pub async fn create(&self, new: NewDeal) -> AppResult<WholesaleDeal> {
        if !self.store.exists::<Society>(&new.society_id).await? {
            return Err(AppError::NotFound("Society not found".to_string()));
        }
        let deal = new.into_deal(self.store.next_id(), now())?;
        self.store.create(&deal).await?;
        info!("Created wholesale deal {} in society {}", deal.id, deal.society_id);
        Ok(deal)
    }

    pub async fn get(&self, id: &DocId) -> AppResult<WholesaleDeal> {
        self.store.gen_enforce(id).await
    }

    /// Deals of a society, newest first.
    pub async fn list_by_society(&self, society_id: &DocId) -> AppResult<Vec<WholesaleDeal>> {
        let query = WholesaleDeal::query()
            .eq("societyId", society_id.as_str())
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    /// Deals posted by `user_id`, newest first.
    pub async fn list_by_owner(&self, user_id: &DocId) -> AppResult<Vec<WholesaleDeal>> {
        let query = WholesaleDeal::query()
            .eq("userId", user_id.as_str())
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    /// A price change reprices every sub-order in the same update, then refreshes buyers' pointers.
    pub async fn patch(&self, id: &DocId, request: DealPatchRequest) -> AppResult<WholesaleDeal> {
        let patches = request.into_patches()?;
        let update = patches
            .iter()
            .try_fold(Update::new(), |update, patch| patch.apply(update))?;
        let deal: WholesaleDeal = self.store.update_enforce(id, &touch(update, now())).await?;

        if patches.iter().any(|patch| patch.reprices_orders()) && !deal.orders.is_empty() {
            info!("Repriced {} orders on deal {}", deal.orders.len(), deal.id);
            self.pointers
                .sync_sub_orders(SourceType::Wholesale, &deal.id, &deal.orders)
                .await;
        }
        Ok(deal)
    }

    pub async fn delete(&self, id: &DocId) -> AppResult<()> {
        if !self.store.delete::<WholesaleDeal>(id).await? {
            return Err(WholesaleDeal::not_found());
        }
        info!("Deleted wholesale deal {}", id);
        Ok(())
    }

    /// Mark active deals of a society whose order deadline has passed as expired.
    pub async fn expire(&self, society_id: &DocId) -> AppResult<ExpirySweep> {
        self.expire_at(society_id, now()).await
    }

    async fn expire_at(&self, society_id: &DocId, at: DateTime<Utc>) -> AppResult<ExpirySweep> {
        let query = WholesaleDeal::query()
            .eq("societyId", society_id.as_str())
            .eq("dealStatus", "active");
        let overdue = self
            .store
            .gen_all::<WholesaleDeal>(&query)
            .await?
            .into_iter()
            .filter(|deal| deal.order_deadline_date.is_some_and(|deadline| deadline < at));

        let expire = touch(Update::new().set("dealStatus", "expired"), at);
        let mut deal_ids = Vec::new();
        for deal in overdue {
            match self.store.update::<WholesaleDeal>(&deal.id, &expire).await {
                Ok(outcome) if outcome.matched => deal_ids.push(deal.id),
                Ok(_) => {}
                Err(e) => warn!("Could not expire deal {}: {}", deal.id, e),
            }
        }

        if !deal_ids.is_empty() {
            info!("Expired {} deals in society {}", deal_ids.len(), society_id);
        }
        Ok(ExpirySweep {
            expired_count: deal_ids.len(),
            deal_ids,
        })
    }
}
