use tracing::info;

use crate::entities::{Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{now, touch, SourceType};
use crate::models::feed::{Feed, FeedKind, FeedPatchRequest, FeedType, NewFeed};
use crate::models::{Society, User};
use crate::services::pointer_sync::PointerSync;

#[derive(Clone)]
pub struct FeedDirectory {
    store: EntityStore,
    pointers: PointerSync,
}

impl FeedDirectory {
    pub fn new(store: EntityStore, pointers: PointerSync) -> Self {
        Self { store, pointers }
    }

    pub async fn create(&self, new: NewFeed) -> AppResult<Feed> {
        if !self.store.exists::<User>(&new.user_id).await? {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        if !self.store.exists::<Society>(&new.society_id).await? {
            return Err(AppError::NotFound("Society not found".to_string()));
        }
        let feed = new.into_feed(self.store.next_id(), now())?;
        self.store.create(&feed).await?;
        info!("Created {} {} in society {}", feed.kind.feed_type().as_str(), feed.id, feed.society_id);
        Ok(feed)
    }

    pub async fn get(&self, id: &DocId) -> AppResult<Feed> {
        self.store.gen_enforce(id).await
    }

    /// Feeds of a society, newest first, optionally of one type.
    pub async fn list_by_society(
        &self,
        society_id: &DocId,
        feed_type: Option<FeedType>,
    ) -> AppResult<Vec<Feed>> {
        let mut query = Feed::query().eq("societyId", society_id.as_str());
        if let Some(feed_type) = feed_type {
            query = query.eq("type", feed_type.as_str());
        }
        self.store.gen_all(&query.sort_desc("createdAt")).await
    }

    pub async fn list_by_user(&self, user_id: &DocId) -> AppResult<Vec<Feed>> {
        let query = Feed::query()
            .eq("userId", user_id.as_str())
            .sort_desc("createdAt");
        self.store.gen_all(&query).await
    }

    pub async fn patch(&self, id: &DocId, request: FeedPatchRequest) -> AppResult<Feed> {
        let patches = request.into_patches()?;
        let feed_type = self.get(id).await?.kind.feed_type();
        let update = patches
            .iter()
            .try_fold(Update::new(), |update, patch| patch.apply(feed_type, update))?;
        self.store.update_enforce(id, &touch(update, now())).await
    }

    /// Delete a feed. Registrations for a deleted event are dropped from the attendees' orders.
    pub async fn delete(&self, id: &DocId) -> AppResult<()> {
        let feed = self.get(id).await?;
        if !self.store.delete::<Feed>(id).await? {
            return Err(Feed::not_found());
        }
        if let FeedKind::Event { rsvps, .. } = feed.kind {
            for rsvp in rsvps {
                self.pointers
                    .remove_best_effort(&rsvp.user_id, SourceType::Event, id)
                    .await;
            }
        }
        info!("Deleted feed {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewSociety, NewUser};
    use crate::services::directory::testing::store;
    use crate::services::rsvp_service::{RsvpInput, RsvpService};
    use serde_json::json;

    struct Fixture {
        store: EntityStore,
        feeds: FeedDirectory,
        user: DocId,
        society: DocId,
    }

    async fn fixture() -> Fixture {
        let store = store().await;
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
        Fixture {
            feeds: FeedDirectory::new(store.clone(), PointerSync::new(store.clone())),
            store,
            user: user.id,
            society: society.id,
        }
    }

    fn new_feed(f: &Fixture, kind: serde_json::Value) -> NewFeed {
        let mut body = json!({"userId": f.user.as_str(), "societyId": f.society.as_str()});
        for (key, value) in kind.as_object().unwrap() {
            body[key] = value.clone();
        }
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_list_filters_by_type_newest_first() {
        let f = fixture().await;
        let first = f.feeds.create(new_feed(&f, json!({"type": "post", "content": "one"}))).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        f.feeds
            .create(new_feed(&f, json!({"type": "event", "location": "Clubhouse"})))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let last = f.feeds.create(new_feed(&f, json!({"type": "post", "content": "two"}))).await.unwrap();

        let all = f.feeds.list_by_society(&f.society, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, last.id);

        let posts = f.feeds.list_by_society(&f.society, Some(FeedType::Post)).await.unwrap();
        let ids: Vec<DocId> = posts.into_iter().map(|feed| feed.id).collect();
        assert_eq!(ids, vec![last.id, first.id]);

        assert_eq!(f.feeds.list_by_user(&f.user).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_patch_respects_feed_type() {
        let f = fixture().await;
        let post = f.feeds.create(new_feed(&f, json!({"type": "post", "content": "one"}))).await.unwrap();

        let err = f
            .feeds
            .patch(&post.id, serde_json::from_value(json!({"location": "Gate 2"})).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let patched = f
            .feeds
            .patch(&post.id, serde_json::from_value(json!({"content": "edited"})).unwrap())
            .await
            .unwrap();
        assert_eq!(patched.kind, FeedKind::Post { content: "edited".into() });
    }

    #[tokio::test]
    async fn test_deleting_an_event_clears_attendee_pointers() {
        let f = fixture().await;
        let event = f
            .feeds
            .create(new_feed(&f, json!({"type": "event", "location": "Clubhouse"})))
            .await
            .unwrap();
        let rsvps = RsvpService::new(f.store.clone(), PointerSync::new(f.store.clone()));
        rsvps
            .add_or_update(&event.id, &f.user, RsvpInput { participants: 2, ..Default::default() })
            .await
            .unwrap();
        let user: User = f.store.gen_enforce(&f.user).await.unwrap();
        assert_eq!(user.orders.len(), 1);

        f.feeds.delete(&event.id).await.unwrap();
        let user: User = f.store.gen_enforce(&f.user).await.unwrap();
        assert!(user.orders.is_empty());
        assert!(matches!(f.feeds.get(&event.id).await, Err(AppError::NotFound(_))));
    }
}
