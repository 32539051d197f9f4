use tracing::info;

use crate::entities::{Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{now, touch, VerificationStatus};
use crate::models::request::{NewUserRequest, UserRequest};
use crate::models::User;

#[derive(Clone)]
pub struct RequestDirectory {
    store: EntityStore,
}

impl RequestDirectory {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewUserRequest) -> AppResult<UserRequest> {
        if !self.store.exists::<User>(&new.user_id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        let request = new.into_request(self.store.next_id(), now())?;
        self.store.create(&request).await?;
        info!("User {} opened request {}", request.user_id, request.id);
        Ok(request)
    }

    /// Requests in `status`, newest first.
    pub async fn list_by_status(&self, status: VerificationStatus) -> AppResult<Vec<UserRequest>> {
        let query = UserRequest::query()
            .eq("status", serde_json::to_value(status)?)
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    pub async fn list_by_user(&self, user_id: &DocId) -> AppResult<Vec<UserRequest>> {
        let query = UserRequest::query()
            .eq("userId", user_id.as_str())
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    pub async fn update_status(
        &self,
        id: &DocId,
        status: VerificationStatus,
    ) -> AppResult<UserRequest> {
        let update = touch(Update::new().set("status", serde_json::to_value(status)?), now());
        let request: UserRequest = self.store.update_enforce(id, &update).await?;
        info!("Request {} is now {:?}", request.id, request.status);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::services::directory::testing::store;
    use serde_json::json;

    async fn user(store: &EntityStore, phone: &str) -> User {
        let user = serde_json::from_value::<NewUser>(json!({"phone": phone}))
            .unwrap()
            .into_user(store.next_id(), now())
            .unwrap();
        store.create(&user).await.unwrap();
        user
    }

    fn new_request(user: &User, message: &str) -> NewUserRequest {
        serde_json::from_value(json!({"userId": user.id.as_str(), "message": message})).unwrap()
    }

    #[tokio::test]
    async fn test_create_requires_existing_user() {
        let store = store().await;
        let requests = RequestDirectory::new(store.clone());
        let new: NewUserRequest = serde_json::from_value(
            json!({"userId": store.next_id().as_str(), "message": "Verify me"}),
        )
        .unwrap();
        assert!(matches!(requests.create(new).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_moves_request_between_listings() {
        let store = store().await;
        let requests = RequestDirectory::new(store.clone());
        let asha = user(&store, "+919800000001").await;
        let ravi = user(&store, "+919800000002").await;

        let first = requests.create(new_request(&asha, "Verify flat A-101")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = requests.create(new_request(&ravi, "Verify flat C-303")).await.unwrap();

        let pending = requests.list_by_status(VerificationStatus::Pending).await.unwrap();
        let ids: Vec<&DocId> = pending.iter().map(|request| &request.id).collect();
        assert_eq!(ids, vec![&second.id, &first.id]);

        let approved = requests
            .update_status(&first.id, VerificationStatus::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, VerificationStatus::Approved);
        assert!(approved.updated_at >= first.updated_at);

        let pending = requests.list_by_status(VerificationStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
        assert_eq!(
            requests.list_by_status(VerificationStatus::Approved).await.unwrap()[0].id,
            first.id
        );
        assert_eq!(requests.list_by_user(&ravi.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_request_is_not_found() {
        let store = store().await;
        let requests = RequestDirectory::new(store.clone());
        let err = requests
            .update_status(&store.next_id(), VerificationStatus::Rejected)
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(message) => assert_eq!(message, "Request not found"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
