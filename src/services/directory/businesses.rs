// Businesses and the owner's `businessIds` links that mirror their verification status.

use tracing::{info, warn};

use crate::entities::{Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{ElementFilter, Update};
use crate::models::business::{Business, BusinessPatchRequest, NewBusiness};
use crate::models::common::{now, touch, SourceType, VerificationStatus};
use crate::models::user::BusinessLink;
use crate::models::{Society, User};
use crate::services::pointer_sync::PointerSync;

#[derive(Clone)]
pub struct BusinessDirectory {
    store: EntityStore,
    pointers: PointerSync,
}

impl BusinessDirectory {
    pub fn new(store: EntityStore, pointers: PointerSync) -> Self {
        Self { store, pointers }
    }

    pub async fn create(&self, new: NewBusiness) -> AppResult<Business> {
        if !self.store.exists::<User>(&new.user_id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        if !self.store.exists::<Society>(&new.society_id).await? {
            return Err(AppError::NotFound("Society not found".to_string()));
        }

        let business = new.into_business(self.store.next_id(), now())?;
        self.store.create(&business).await?;

        let link = BusinessLink {
            business_id: business.id.clone(),
            verification_status: business.verification_status,
        };
        let update = touch(
            Update::new()
                .when_lacks("businessIds", link_filter(&business.id))
                .push("businessIds", serde_json::to_value(&link)?),
            now(),
        );
        if let Err(e) = self.store.update::<User>(&business.user_id, &update).await {
            warn!(
                "Could not link business {} to owner {}: {}",
                business.id, business.user_id, e
            );
        }

        info!("Created business {} for user {}", business.id, business.user_id);
        Ok(business)
    }

    pub async fn get(&self, id: &DocId) -> AppResult<Business> {
        self.store.gen_enforce(id).await
    }

    pub async fn patch(&self, id: &DocId, request: BusinessPatchRequest) -> AppResult<Business> {
        let patches = request.into_patches()?;
        let update = patches
            .iter()
            .try_fold(Update::new(), |update, patch| patch.apply(update))?;
        let business: Business = self.store.update_enforce(id, &touch(update, now())).await?;

        if let Some(status) = patches.iter().find_map(|patch| patch.verification_status()) {
            self.mirror_status(&business, status).await;
        }
        if patches.iter().any(|patch| patch.reprices_orders()) && !business.orders.is_empty() {
            info!("Repriced {} orders on business {}", business.orders.len(), business.id);
            self.pointers
                .sync_sub_orders(SourceType::Business, &business.id, &business.orders)
                .await;
        }
        Ok(business)
    }

    pub async fn delete(&self, id: &DocId) -> AppResult<Business> {
        let business: Business = self.store.gen_enforce(id).await?;
        if !self.store.delete::<Business>(id).await? {
            return Err(AppError::NotFound("Business not found".to_string()));
        }

        let unlink = touch(Update::new().pull("businessIds", link_filter(id)), now());
        if let Err(e) = self.store.update::<User>(&business.user_id, &unlink).await {
            warn!("Could not unlink business {} from {}: {}", id, business.user_id, e);
        }
        info!("Deleted business {}", id);
        Ok(business)
    }

    /// Every business, newest first.
    pub async fn list_all(&self) -> AppResult<Vec<Business>> {
        self.store.gen_all(&Business::query().sort_desc("createdAt")).await
    }

    pub async fn list_by_society(&self, society_id: &DocId) -> AppResult<Vec<Business>> {
        let query = Business::query()
            .eq("societyId", society_id.as_str())
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    /// Rebuild the owner's `businessIds` from the businesses they own.
    pub async fn sync_owner_links(&self, owner_id: &DocId) -> AppResult<User> {
        let owned: Vec<Business> = self
            .store
            .gen_all(&Business::query().eq("userId", owner_id.as_str()).sort_asc("createdAt"))
            .await?;
        let links: Vec<BusinessLink> = owned
            .iter()
            .map(|business| BusinessLink {
                business_id: business.id.clone(),
                verification_status: business.verification_status,
            })
            .collect();

        let update = touch(Update::new().set("businessIds", serde_json::to_value(&links)?), now());
        let user: User = self.store.update_enforce(owner_id, &update).await?;
        info!("Synced {} business links for user {}", links.len(), owner_id);
        Ok(user)
    }

    /// Refresh the cached status on each of the owner's links and drop links to deleted businesses.
    pub async fn refresh_owner_link_statuses(&self, owner_id: &DocId) -> AppResult<User> {
        let owner: User = self.store.gen_enforce(owner_id).await?;
        for link in &owner.business_ids {
            let filter = link_filter(&link.business_id);
            let update = match self.store.gen_nullable::<Business>(&link.business_id).await? {
                Some(business) if business.verification_status == link.verification_status => {
                    continue
                }
                Some(business) => Update::new()
                    .when_contains("businessIds", filter.clone())
                    .set_element(
                        "businessIds",
                        filter,
                        "verificationStatus",
                        serde_json::to_value(business.verification_status)?,
                    ),
                None => {
                    warn!("Dropping link from {} to missing business {}", owner_id, link.business_id);
                    Update::new().pull("businessIds", filter)
                }
            };
            self.store.update::<User>(owner_id, &touch(update, now())).await?;
        }
        self.store.gen_enforce(owner_id).await
    }

    async fn mirror_status(&self, business: &Business, status: VerificationStatus) {
        let filter = link_filter(&business.id);
        let update = match serde_json::to_value(status) {
            Ok(status) => Update::new()
                .when_contains("businessIds", filter.clone())
                .set_element("businessIds", filter, "verificationStatus", status),
            Err(e) => {
                warn!("Could not encode verification status: {}", e);
                return;
            }
        };
        match self
            .store
            .database()
            .update(Collection::Users, &business.user_id, &update)
            .await
        {
            Ok(outcome) if !outcome.matched => warn!(
                "Owner {} has no link to business {}",
                business.user_id, business.id
            ),
            Ok(_) => {}
            Err(e) => warn!(
                "Could not mirror verification of business {} to {}: {}",
                business.id, business.user_id, e
            ),
        }
    }
}

fn link_filter(business_id: &DocId) -> ElementFilter {
    ElementFilter::eq("businessId", business_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::DeliveryInfo;
    use crate::models::{NewSociety, NewUser};
    use crate::services::order_service::{OrderService, OrderTarget};
    use crate::services::directory::testing::store;
    use serde_json::json;

    async fn owner_and_society(store: &EntityStore) -> (User, Society) {
        let user = serde_json::from_value::<NewUser>(json!({"phone": "+919876543210"}))
            .unwrap()
            .into_user(store.next_id(), now())
            .unwrap();
        store.create(&user).await.unwrap();
        let society = serde_json::from_value::<NewSociety>(json!({"name": "Lake View"}))
            .unwrap()
            .into_society(store.next_id(), now())
            .unwrap();
        store.create(&society).await.unwrap();
        (user, society)
    }

    #[tokio::test]
    async fn test_owner_link_follows_verification() {
        let store = store().await;
        let businesses = BusinessDirectory::new(store.clone(), PointerSync::new(store.clone()));
        let (owner, society) = owner_and_society(&store).await;

        let business = businesses
            .create(
                serde_json::from_value(json!({
                    "title": "Sharma Tiffins",
                    "userId": owner.id.as_str(),
                    "societyId": society.id.as_str(),
                    "price": 80.0
                }))
                .unwrap(),
            )
            .await
            .unwrap();

        let linked: User = store.gen_enforce(&owner.id).await.unwrap();
        assert_eq!(linked.business_ids.len(), 1);
        assert_eq!(linked.business_ids[0].verification_status, VerificationStatus::Pending);

        let patched = businesses
            .patch(
                &business.id,
                serde_json::from_value(json!({"verificationStatus": "approved"})).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(patched.verification_status, VerificationStatus::Approved);
        let linked: User = store.gen_enforce(&owner.id).await.unwrap();
        assert_eq!(linked.business_ids[0].verification_status, VerificationStatus::Approved);

        businesses.delete(&business.id).await.unwrap();
        let unlinked: User = store.gen_enforce(&owner.id).await.unwrap();
        assert!(unlinked.business_ids.is_empty());
        assert!(matches!(
            businesses.get(&business.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_requires_owner_and_society() {
        let store = store().await;
        let businesses = BusinessDirectory::new(store.clone(), PointerSync::new(store.clone()));
        let (owner, _) = owner_and_society(&store).await;

        let err = businesses
            .create(
                serde_json::from_value(json!({
                    "title": "Sharma Tiffins",
                    "userId": owner.id.as_str(),
                    "societyId": store.next_id().as_str()
                }))
                .unwrap(),
            )
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(message) => assert_eq!(message, "Society not found"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_price_change_reprices_orders_and_pointers() {
        let store = store().await;
        let pointers = PointerSync::new(store.clone());
        let businesses = BusinessDirectory::new(store.clone(), pointers.clone());
        let orders = OrderService::new(store.clone(), pointers);
        let (owner, society) = owner_and_society(&store).await;
        let buyer = serde_json::from_value::<NewUser>(json!({"phone": "+919833333333"}))
            .unwrap()
            .into_user(store.next_id(), now())
            .unwrap();
        store.create(&buyer).await.unwrap();

        let business = businesses
            .create(
                serde_json::from_value(json!({
                    "title": "Sharma Tiffins",
                    "userId": owner.id.as_str(),
                    "societyId": society.id.as_str(),
                    "price": 80.0
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        orders
            .upsert_order(OrderTarget::Business, &business.id, &buyer.id, 3, DeliveryInfo::default())
            .await
            .unwrap();

        let patched = businesses
            .patch(&business.id, serde_json::from_value(json!({"price": 90.0})).unwrap())
            .await
            .unwrap();
        assert_eq!(patched.orders[0].amount, 270.0);

        let stored: User = store.gen_enforce(&buyer.id).await.unwrap();
        assert_eq!(stored.orders[0].amount, 270.0);
        assert_eq!(stored.orders[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_owner_links_are_rebuilt_and_refreshed() {
        let store = store().await;
        let businesses = BusinessDirectory::new(store.clone(), PointerSync::new(store.clone()));
        let (owner, society) = owner_and_society(&store).await;

        let mut created = Vec::new();
        for title in ["Sharma Tiffins", "Rao Tailors"] {
            let business = businesses
                .create(
                    serde_json::from_value(json!({
                        "title": title,
                        "userId": owner.id.as_str(),
                        "societyId": society.id.as_str()
                    }))
                    .unwrap(),
                )
                .await
                .unwrap();
            created.push(business);
        }
        assert_eq!(businesses.list_all().await.unwrap().len(), 2);
        assert_eq!(businesses.list_by_society(&society.id).await.unwrap().len(), 2);
        assert!(businesses.list_by_society(&store.next_id()).await.unwrap().is_empty());

        // Lose the links, then change a status behind the owner's back.
        let wipe = Update::new().set("businessIds", json!([]));
        store.update::<User>(&owner.id, &wipe).await.unwrap();
        let approve = Update::new().set("verificationStatus", "approved");
        store.update::<Business>(&created[1].id, &approve).await.unwrap();

        let synced = businesses.sync_owner_links(&owner.id).await.unwrap();
        assert_eq!(synced.business_ids.len(), 2);
        let link = synced
            .business_ids
            .iter()
            .find(|link| link.business_id == created[1].id)
            .unwrap();
        assert_eq!(link.verification_status, VerificationStatus::Approved);

        let reject = Update::new().set("verificationStatus", "rejected");
        store.update::<Business>(&created[0].id, &reject).await.unwrap();
        store.delete::<Business>(&created[1].id).await.unwrap();

        let refreshed = businesses.refresh_owner_link_statuses(&owner.id).await.unwrap();
        assert_eq!(refreshed.business_ids.len(), 1);
        assert_eq!(refreshed.business_ids[0].business_id, created[0].id);
        assert_eq!(refreshed.business_ids[0].verification_status, VerificationStatus::Rejected);
    }

    #[tokio::test]
    async fn test_sync_for_missing_owner_is_not_found() {
        let store = store().await;
        let businesses = BusinessDirectory::new(store.clone(), PointerSync::new(store.clone()));
        assert!(matches!(
            businesses.sync_owner_links(&store.next_id()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            businesses.refresh_owner_link_statuses(&store.next_id()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
