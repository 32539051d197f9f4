// Daily services are keyed by phone. Registering a known phone merges the societies and
// residents into the existing record instead of creating a second one.

use serde::Serialize;
use tracing::{debug, info};

use crate::entities::{Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{now, touch};
use crate::models::daily_service::{DailyService, NewDailyService};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyServiceList {
    pub data: Vec<DailyService>,
    pub pending_req: u64,
    pub total_count: u64,
}

#[derive(Clone)]
pub struct DailyServiceDirectory {
    store: EntityStore,
}

impl DailyServiceDirectory {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Returns the stored service and whether it was newly created.
    pub async fn create(&self, new: NewDailyService) -> AppResult<(DailyService, bool)> {
        new.validate()?;
        let phone = new.phone.trim().to_string();

        if let Some(existing) = self.find_by_phone(&phone).await? {
            return Ok((self.merge(&existing.id, &new).await?, false));
        }

        let service = new.clone().into_daily_service(self.store.next_id(), now())?;
        match self.store.create(&service).await {
            Ok(()) => {
                info!("Created daily service {} ({})", service.id, service.phone);
                Ok((service, true))
            }
            // Lost a race with another registration of the same phone.
            Err(AppError::Conflict(_)) => {
                let existing = self
                    .find_by_phone(&phone)
                    .await?
                    .ok_or_else(|| AppError::Internal(format!("Daily service {} vanished", phone)))?;
                Ok((self.merge(&existing.id, &new).await?, false))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self) -> AppResult<DailyServiceList> {
        let data: Vec<DailyService> = self
            .store
            .gen_all(&DailyService::query().sort_desc("createdAt"))
            .await?;
        let pending_req = self
            .store
            .count(&DailyService::query().eq("verificationStatus", "pending"))
            .await?;
        Ok(DailyServiceList {
            total_count: data.len() as u64,
            pending_req,
            data,
        })
    }

    async fn find_by_phone(&self, phone: &str) -> AppResult<Option<DailyService>> {
        let mut found = self
            .store
            .gen_all::<DailyService>(&DailyService::query().eq("phone", phone).page(0, 1))
            .await?;
        Ok(found.pop())
    }

    async fn merge(&self, id: &DocId, new: &NewDailyService) -> AppResult<DailyService> {
        let mut update = Update::new();
        for society_id in &new.society_ids {
            update = update.add_to_set("societyIds", society_id.as_str());
        }
        for user_id in &new.user_ids {
            update = update.add_to_set("userIds", user_id.as_str());
        }
        debug!("Merging registration into daily service {}", id);
        self.store.update_enforce(id, &touch(update, now())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::testing::store;
    use serde_json::json;

    #[tokio::test]
    async fn test_known_phone_merges_societies() {
        let store = store().await;
        let services = DailyServiceDirectory::new(store.clone());
        let (a, b) = (store.next_id(), store.next_id());

        let (first, created) = services
            .create(
                serde_json::from_value(json!({
                    "name": "Sunita",
                    "phone": "+919822222222",
                    "category": "maid",
                    "societyIds": [a.as_str()]
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        assert!(created);

        let (merged, created) = services
            .create(
                serde_json::from_value(json!({
                    "name": "Sunita",
                    "phone": "+919822222222",
                    "societyIds": [a.as_str(), b.as_str()]
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.society_ids, vec![a, b]);

        let list = services.list().await.unwrap();
        assert_eq!(list.total_count, 1);
        assert_eq!(list.pending_req, 1);
    }
}
