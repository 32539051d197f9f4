use tracing::info;

use crate::entities::{Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{now, touch, OrderPointer};
use crate::models::user::{NewUser, User, UserPatch, UserPatchRequest};
use crate::models::Society;

#[derive(Clone)]
pub struct UserDirectory {
    store: EntityStore,
}

impl UserDirectory {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewUser) -> AppResult<User> {
        let user = new.into_user(self.store.next_id(), now())?;
        self.store.create(&user).await.map_err(|e| match e {
            AppError::Conflict(_) => {
                AppError::Conflict("A user with this phone number already exists".to_string())
            }
            other => other,
        })?;
        info!("Created user {}", user.id);
        Ok(user)
    }

    pub async fn get(&self, id: &DocId) -> AppResult<User> {
        self.store.gen_enforce(id).await
    }

    pub async fn patch(&self, id: &DocId, request: UserPatchRequest) -> AppResult<User> {
        let patches = request.into_patches()?;
        for patch in &patches {
            if let UserPatch::SelectedSociety { society_id, .. } = patch {
                if !self.store.exists::<Society>(society_id).await? {
                    return Err(AppError::NotFound("Society not found".to_string()));
                }
            }
        }

        let update = patches
            .iter()
            .try_fold(Update::new(), |update, patch| patch.apply(update))?;
        self.store.update_enforce(id, &touch(update, now())).await
    }

    /// Users whose selected society is `society_id`, newest first.
    pub async fn list_by_society(&self, society_id: &DocId) -> AppResult<Vec<User>> {
        let query = User::query()
            .eq("selectedSocietyId", society_id.as_str())
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    /// Users of a society still waiting for verification.
    pub async fn pending_by_society(&self, society_id: &DocId) -> AppResult<Vec<User>> {
        let query = User::query()
            .eq("selectedSocietyId", society_id.as_str())
            .eq("verifyStatus", "pending")
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    /// The user's order pointers, most recently touched first.
    pub async fn orders(&self, id: &DocId) -> AppResult<Vec<OrderPointer>> {
        let user: User = self.store.gen_enforce(id).await?;
        let mut orders = user.orders;
        orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;
    use crate::services::directory::testing::store;
    use serde_json::json;

    #[tokio::test]
    async fn test_phone_is_unique() {
        let users = UserDirectory::new(store().await);
        let new = || serde_json::from_value::<NewUser>(json!({"phone": "+919876543210"})).unwrap();

        users.create(new()).await.unwrap();
        match users.create(new()).await.unwrap_err() {
            AppError::Conflict(message) => assert!(message.contains("phone")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_patch_checks_selected_society() {
        let store = store().await;
        let users = UserDirectory::new(store.clone());
        let user = users
            .create(serde_json::from_value(json!({"phone": "+919876543210"})).unwrap())
            .await
            .unwrap();

        let request = serde_json::from_value::<UserPatchRequest>(json!({
            "selectedSocietyId": store.next_id().as_str(),
        }))
        .unwrap();
        assert!(matches!(
            users.patch(&user.id, request).await,
            Err(AppError::NotFound(_))
        ));

        let request = serde_json::from_value::<UserPatchRequest>(json!({
            "fullName": "Asha Rao",
            "roles": ["resident"]
        }))
        .unwrap();
        let patched = users.patch(&user.id, request).await.unwrap();
        assert_eq!(patched.full_name.as_deref(), Some("Asha Rao"));
        assert_eq!(patched.roles, vec![Role::Resident]);
        assert!(patched.updated_at >= user.updated_at);
    }

    #[tokio::test]
    async fn test_society_listings_filter_on_selected_society() {
        let store = store().await;
        let users = UserDirectory::new(store.clone());
        let society = store.next_id();
        let other = store.next_id();

        let new = |phone: &str, society: &DocId| {
            serde_json::from_value::<NewUser>(json!({
                "phone": phone,
                "selectedSocietyId": society.as_str(),
            }))
            .unwrap()
        };
        let asha = users.create(new("+919800000001", &society)).await.unwrap();
        let ravi = users.create(new("+919800000002", &society)).await.unwrap();
        users.create(new("+919800000003", &other)).await.unwrap();

        let request = serde_json::from_value::<UserPatchRequest>(json!({
            "verifyStatus": "approved",
        }))
        .unwrap();
        users.patch(&asha.id, request).await.unwrap();

        assert_eq!(users.list_by_society(&society).await.unwrap().len(), 2);
        let pending = users.pending_by_society(&society).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ravi.id);
    }

    #[tokio::test]
    async fn test_orders_of_missing_user_is_not_found() {
        let store = store().await;
        let users = UserDirectory::new(store.clone());
        assert!(matches!(
            users.orders(&store.next_id()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
