// Event registrations. `registeredParticipants` is recomputed inside every RSVP write.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::entities::{decode, Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{Aggregate, ElementFilter, Update};
use crate::models::common::{now, to_cents, touch, OrderPointer, OrderStatus, SourceType};
use crate::models::feed::{Feed, FeedKind, FeedType, Rsvp};
use crate::models::validation::Validator;
use crate::services::pointer_sync::PointerSync;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpInput {
    #[serde(default)]
    pub price: f64,
    #[serde(default = "default_participants")]
    pub participants: u32,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

fn default_participants() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpResult {
    pub rsvp: Rsvp,
    pub registered_participants: u64,
    /// False when an existing registration was updated.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RsvpRemoval {
    pub registered_participants: u64,
}

#[derive(Clone)]
pub struct RsvpService {
    store: EntityStore,
    pointers: PointerSync,
}

impl RsvpService {
    pub fn new(store: EntityStore, pointers: PointerSync) -> Self {
        Self { store, pointers }
    }

    pub async fn add_or_update(
        &self,
        feed_id: &DocId,
        user_id: &DocId,
        input: RsvpInput,
    ) -> AppResult<RsvpResult> {
        Validator::new()
            .check(input.participants >= 1, "participants must be at least 1")
            .check(
                input.price.is_finite() && input.price >= 0.0,
                "price must be a non-negative number",
            )
            .finish()?;
        self.require_event(feed_id).await?;

        let price = to_cents(input.price);
        let mine = ElementFilter::eq("userId", user_id.as_str());
        let db = self.store.database();

        let mut result = None;
        for _ in 0..2 {
            let stamp = now();
            let update = registered_total(
                Update::new()
                    .when_contains("rsvps", mine.clone())
                    .set_element("rsvps", mine.clone(), "price", price)
                    .set_element("rsvps", mine.clone(), "participants", input.participants)
                    .set_element(
                        "rsvps",
                        mine.clone(),
                        "profilePhotoUrl",
                        input.profile_photo_url.clone(),
                    )
                    .set_element("rsvps", mine.clone(), "fullName", input.full_name.clone())
                    .set_element("rsvps", mine.clone(), "updatedAt", stamp.timestamp_millis()),
            );
            let outcome = db.update(Collection::Feeds, feed_id, &update).await?;
            if outcome.matched {
                result = outcome.document.map(|doc| (doc, false));
                break;
            }
            if outcome.document.is_none() {
                return Err(Feed::not_found());
            }

            let rsvp = Rsvp {
                id: self.store.next_id(),
                user_id: user_id.clone(),
                price,
                participants: input.participants,
                profile_photo_url: input.profile_photo_url.clone(),
                full_name: input.full_name.clone(),
                registered_at: stamp,
                updated_at: stamp,
            };
            let push = registered_total(
                Update::new()
                    .when_lacks("rsvps", mine.clone())
                    .push("rsvps", serde_json::to_value(&rsvp)?),
            );
            let outcome = db.update(Collection::Feeds, feed_id, &push).await?;
            if outcome.matched {
                result = outcome.document.map(|doc| (doc, true));
                break;
            }
        }

        let (document, created) = result.ok_or_else(|| {
            AppError::Internal(format!("Could not settle RSVP for user {} on {}", user_id, feed_id))
        })?;
        let feed: Feed = decode(document)?;
        let (rsvp, registered_participants) = match feed.kind {
            FeedKind::Event {
                rsvps,
                registered_participants,
                ..
            } => (
                rsvps
                    .into_iter()
                    .find(|rsvp| &rsvp.user_id == user_id)
                    .ok_or_else(|| AppError::Internal("RSVP vanished after write".to_string()))?,
                registered_participants,
            ),
            _ => return Err(not_an_event()),
        };

        self.pointers
            .upsert_best_effort(
                user_id,
                &OrderPointer {
                    source_type: SourceType::Event,
                    source_id: feed_id.clone(),
                    order_id: Some(rsvp.id.clone()),
                    quantity: rsvp.participants,
                    amount: rsvp.price,
                    status: OrderStatus::Registered,
                    updated_at: rsvp.updated_at,
                },
            )
            .await;

        info!(
            "RSVP {} for user {} on event {} ({} participants)",
            if created { "created" } else { "updated" },
            user_id,
            feed_id,
            rsvp.participants
        );
        Ok(RsvpResult {
            rsvp,
            registered_participants,
            created,
        })
    }

    pub async fn remove(&self, feed_id: &DocId, user_id: &DocId) -> AppResult<RsvpRemoval> {
        self.require_event(feed_id).await?;

        let mine = ElementFilter::eq("userId", user_id.as_str());
        let update = touch(
            registered_total(
                Update::new()
                    .when_contains("rsvps", mine.clone())
                    .pull("rsvps", mine),
            ),
            now(),
        );
        let outcome = self
            .store
            .database()
            .update(Collection::Feeds, feed_id, &update)
            .await?;
        let document = match (outcome.matched, outcome.document) {
            (true, Some(document)) => document,
            (false, Some(_)) => {
                return Err(AppError::NotFound("No RSVP found for this user".to_string()))
            }
            (_, None) => return Err(Feed::not_found()),
        };
        let feed: Feed = decode(document)?;
        let registered_participants = match feed.kind {
            FeedKind::Event {
                registered_participants,
                ..
            } => registered_participants,
            _ => 0,
        };

        self.pointers
            .remove_best_effort(user_id, SourceType::Event, feed_id)
            .await;

        info!("RSVP removed for user {} on event {}", user_id, feed_id);
        Ok(RsvpRemoval {
            registered_participants,
        })
    }

    async fn require_event(&self, feed_id: &DocId) -> AppResult<()> {
        let feed: Feed = self.store.gen_enforce(feed_id).await?;
        if feed.kind.feed_type() != FeedType::Event {
            return Err(not_an_event());
        }
        Ok(())
    }
}

fn registered_total(update: Update) -> Update {
    update.recompute(
        "registeredParticipants",
        "rsvps",
        Aggregate::Sum {
            field: "participants".to_string(),
        },
    )
}

fn not_an_event() -> AppError {
    AppError::BadRequest("This feed is not an event".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::id_generator::IdGenerator;
    use crate::infrastructure::sqlite_database::SqliteDocumentDatabase;
    use crate::models::{NewFeed, NewUser, User};
    use serde_json::json;
    use std::sync::Arc;

    async fn setup(kind: serde_json::Value) -> (EntityStore, RsvpService, DocId) {
        let db = SqliteDocumentDatabase::new_in_memory().await.unwrap();
        let store = EntityStore::new(Arc::new(db), Arc::new(IdGenerator::new()));
        let service = RsvpService::new(store.clone(), PointerSync::new(store.clone()));

        let mut body = json!({"userId": store.next_id(), "societyId": store.next_id()});
        for (key, value) in kind.as_object().unwrap() {
            body[key] = value.clone();
        }
        let feed = serde_json::from_value::<NewFeed>(body)
            .unwrap()
            .into_feed(store.next_id(), now())
            .unwrap();
        store.create(&feed).await.unwrap();
        (store, service, feed.id)
    }

    async fn user(store: &EntityStore, phone: &str) -> DocId {
        let user = serde_json::from_value::<NewUser>(json!({"phone": phone}))
            .unwrap()
            .into_user(store.next_id(), now())
            .unwrap();
        store.create(&user).await.unwrap();
        user.id
    }

    fn participants(n: u32) -> RsvpInput {
        RsvpInput {
            price: 0.0,
            participants: n,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_registered_participants_tracks_every_change() {
        let (store, service, event) = setup(json!({"type": "event", "location": "Clubhouse"})).await;
        let a = user(&store, "+919800000001").await;
        let b = user(&store, "+919800000002").await;

        let first = service.add_or_update(&event, &a, participants(2)).await.unwrap();
        assert!(first.created);
        assert_eq!(first.registered_participants, 2);

        let second = service.add_or_update(&event, &b, participants(3)).await.unwrap();
        assert_eq!(second.registered_participants, 5);

        let updated = service.add_or_update(&event, &a, participants(4)).await.unwrap();
        assert!(!updated.created);
        assert_eq!(updated.rsvp.id, first.rsvp.id);
        assert_eq!(updated.registered_participants, 7);

        let removed = service.remove(&event, &a).await.unwrap();
        assert_eq!(removed.registered_participants, 3);

        let a_doc: User = store.gen_enforce(&a).await.unwrap();
        assert!(a_doc.orders.is_empty());
        let b_doc: User = store.gen_enforce(&b).await.unwrap();
        assert_eq!(b_doc.orders[0].status, OrderStatus::Registered);
        assert_eq!(b_doc.orders[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_removing_absent_rsvp_is_not_found() {
        let (store, service, event) = setup(json!({"type": "event"})).await;
        let err = service.remove(&event, &store.next_id()).await.unwrap_err();
        match err {
            AppError::NotFound(message) => assert_eq!(message, "No RSVP found for this user"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rsvp_on_a_post_is_rejected() {
        let (store, service, post) = setup(json!({"type": "post", "content": "Hello"})).await;
        let err = service
            .add_or_update(&post, &store.next_id(), participants(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = service
            .add_or_update(&store.next_id(), &store.next_id(), participants(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_zero_participants_is_invalid() {
        let (store, service, event) = setup(json!({"type": "event"})).await;
        let err = service
            .add_or_update(&event, &store.next_id(), participants(0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationDetails(..)));
    }
}
