// Poll votes, likes, comments and reviews. One atomic document update per call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::entities::{decode, Document, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{lookup, Aggregate, ElementFilter, Update};
use crate::models::common::{now, touch, Comment, Review};
use crate::models::feed::{Feed, FeedKind, PollOption, Vote};
use crate::models::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewTarget {
    Business,
    Wholesale,
    DailyService,
}

impl ReviewTarget {
    fn collection(&self) -> Collection {
        match self {
            ReviewTarget::Business => Collection::Businesses,
            ReviewTarget::Wholesale => Collection::WholesaleDeals,
            ReviewTarget::DailyService => Collection::DailyServices,
        }
    }

    fn not_found(&self) -> AppError {
        let label = match self {
            ReviewTarget::Business => "Business",
            ReviewTarget::Wholesale => "Wholesale deal",
            ReviewTarget::DailyService => "Daily service",
        };
        AppError::NotFound(format!("{} not found", label))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
    pub user_id: DocId,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub review: Review,
    pub average_rating: f64,
    pub total_reviews: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResult {
    pub option_id: String,
    pub option_name: String,
    pub vote_count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    pub message: String,
    pub results: Vec<OptionResult>,
    pub total_votes: u64,
    pub user_vote: String,
    /// False when an earlier vote was overwritten.
    pub recorded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResult {
    pub liked: bool,
    pub likes_count: usize,
    pub likes: Vec<DocId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResult {
    pub comment: Comment,
    pub total_comments: usize,
}

#[derive(Clone)]
pub struct EngagementService {
    store: EntityStore,
}

impl EngagementService {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub async fn vote(&self, feed_id: &DocId, user_id: &DocId, option_id: &str) -> AppResult<VoteResult> {
        let feed: Feed = self.store.gen_enforce(feed_id).await?;
        let options = match &feed.kind {
            FeedKind::Poll { options, .. } => options,
            _ => return Err(AppError::BadRequest("This feed is not a poll".to_string())),
        };
        if !options.iter().any(|option| option.id == option_id) {
            return Err(AppError::BadRequest("Invalid option ID".to_string()));
        }

        let mine = ElementFilter::eq("userId", user_id.as_str());
        let db = self.store.database();
        let mut outcome = None;
        for _ in 0..2 {
            let stamp = now();
            let overwrite = Update::new()
                .when_contains("votes", mine.clone())
                .set_element("votes", mine.clone(), "optionId", option_id)
                .set_element("votes", mine.clone(), "votedAt", stamp.timestamp_millis());
            let result = db.update(Collection::Feeds, feed_id, &overwrite).await?;
            if result.matched {
                outcome = result.document.map(|doc| (doc, false));
                break;
            }
            if result.document.is_none() {
                return Err(Feed::not_found());
            }

            let vote = Vote {
                user_id: user_id.clone(),
                option_id: option_id.to_string(),
                voted_at: stamp,
            };
            let append = Update::new()
                .when_lacks("votes", mine.clone())
                .push("votes", serde_json::to_value(&vote)?);
            let result = db.update(Collection::Feeds, feed_id, &append).await?;
            if result.matched {
                outcome = result.document.map(|doc| (doc, true));
                break;
            }
        }

        let (document, recorded) = outcome.ok_or_else(|| {
            AppError::Internal(format!("Could not settle vote for user {} on {}", user_id, feed_id))
        })?;
        let feed: Feed = decode(document)?;
        let FeedKind::Poll { options, votes } = feed.kind else {
            return Err(AppError::BadRequest("This feed is not a poll".to_string()));
        };
        let (results, total_votes) = compute_results(&options, &votes);

        debug!("Vote by {} on poll {}: {}", user_id, feed_id, option_id);
        Ok(VoteResult {
            message: if recorded { "Vote recorded" } else { "Vote updated" }.to_string(),
            results,
            total_votes,
            user_vote: option_id.to_string(),
            recorded,
        })
    }

    pub async fn toggle_like(&self, feed_id: &DocId, user_id: &DocId) -> AppResult<LikeResult> {
        let update = Update::new().toggle_member("likes", user_id.as_str());
        let feed: Feed = self.store.update_enforce(feed_id, &update).await?;
        let liked = feed.likes.contains(user_id);
        debug!(
            "User {} {} feed {}",
            user_id,
            if liked { "liked" } else { "unliked" },
            feed_id
        );
        Ok(LikeResult {
            liked,
            likes_count: feed.likes.len(),
            likes: feed.likes,
        })
    }

    pub async fn add_comment(&self, feed_id: &DocId, user_id: &DocId, text: &str) -> AppResult<CommentResult> {
        Validator::new().non_blank("text", text).finish()?;

        let stamp = now();
        let comment = Comment {
            id: self.store.next_id(),
            user_id: user_id.clone(),
            text: text.trim().to_string(),
            created_at: stamp,
        };
        let update = touch(
            Update::new().push("comments", serde_json::to_value(&comment)?),
            stamp,
        );
        let feed: Feed = self.store.update_enforce(feed_id, &update).await?;
        Ok(CommentResult {
            comment,
            total_comments: feed.comments.len(),
        })
    }

    /// Append a review and recompute the entity's average rating in the same write.
    pub async fn add_review(
        &self,
        target: ReviewTarget,
        entity_id: &DocId,
        input: ReviewInput,
    ) -> AppResult<ReviewResult> {
        Validator::new()
            .check(
                (1..=5).contains(&input.rating),
                "rating must be between 1 and 5",
            )
            .finish()?;

        let stamp = now();
        let review = Review {
            id: self.store.next_id(),
            user_id: input.user_id,
            rating: input.rating,
            comment: input
                .comment
                .map(|comment| comment.trim().to_string())
                .filter(|comment| !comment.is_empty()),
            created_at: stamp,
        };
        let update = touch(
            Update::new()
                .push("reviews", serde_json::to_value(&review)?)
                .recompute(
                    "averageRating",
                    "reviews",
                    Aggregate::Mean {
                        field: "rating".to_string(),
                        decimals: 2,
                    },
                ),
            stamp,
        );
        let outcome = self
            .store
            .database()
            .update(target.collection(), entity_id, &update)
            .await?;
        let document = match (outcome.matched, outcome.document) {
            (true, Some(document)) => document,
            _ => return Err(target.not_found()),
        };

        let average_rating = lookup(&document, "averageRating")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let total_reviews = lookup(&document, "reviews")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);

        info!(
            "Review added to {} {} (average {})",
            target.collection().as_str(),
            entity_id,
            average_rating
        );
        Ok(ReviewResult {
            review,
            average_rating,
            total_reviews,
        })
    }
}

/// Per-option counts and percentages rounded to one decimal place.
pub fn compute_results(options: &[PollOption], votes: &[Vote]) -> (Vec<OptionResult>, u64) {
    let total = votes.len() as u64;
    let results = options
        .iter()
        .map(|option| {
            let count = votes
                .iter()
                .filter(|vote| vote.option_id == option.id)
                .count() as u64;
            let percentage = if total == 0 {
                0.0
            } else {
                (count as f64 / total as f64 * 1000.0).round() / 10.0
            };
            OptionResult {
                option_id: option.id.clone(),
                option_name: option.name.clone(),
                vote_count: count,
                percentage,
            }
        })
        .collect();
    (results, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::id_generator::IdGenerator;
    use crate::infrastructure::sqlite_database::SqliteDocumentDatabase;
    use crate::models::{Business, NewBusiness, NewFeed};
    use serde_json::json;
    use std::sync::Arc;

    async fn store() -> EntityStore {
        let db = SqliteDocumentDatabase::new_in_memory().await.unwrap();
        EntityStore::new(Arc::new(db), Arc::new(IdGenerator::new()))
    }

    async fn feed(store: &EntityStore, kind: serde_json::Value) -> DocId {
        let mut body = json!({"userId": store.next_id(), "societyId": store.next_id()});
        for (key, value) in kind.as_object().unwrap() {
            body[key] = value.clone();
        }
        let feed = serde_json::from_value::<NewFeed>(body)
            .unwrap()
            .into_feed(store.next_id(), now())
            .unwrap();
        store.create(&feed).await.unwrap();
        feed.id
    }

    fn poll() -> serde_json::Value {
        json!({"type": "poll", "options": [
            {"id": "a", "name": "Swimming pool"},
            {"id": "b", "name": "Gym"},
            {"id": "c", "name": "Library"}
        ]})
    }

    #[test]
    fn test_percentages_with_no_votes_are_zero() {
        let options = vec![
            PollOption { id: "a".into(), name: "A".into() },
            PollOption { id: "b".into(), name: "B".into() },
        ];
        let (results, total) = compute_results(&options, &[]);
        assert_eq!(total, 0);
        assert!(results.iter().all(|result| result.percentage == 0.0));
    }

    #[tokio::test]
    async fn test_revote_overwrites_in_place() {
        let store = store().await;
        let service = EngagementService::new(store.clone());
        let poll = feed(&store, poll()).await;
        let (u1, u2, u3) = (store.next_id(), store.next_id(), store.next_id());

        let first = service.vote(&poll, &u1, "a").await.unwrap();
        assert!(first.recorded);
        assert_eq!(first.message, "Vote recorded");
        service.vote(&poll, &u2, "a").await.unwrap();
        service.vote(&poll, &u3, "b").await.unwrap();

        let revote = service.vote(&poll, &u1, "b").await.unwrap();
        assert!(!revote.recorded);
        assert_eq!(revote.message, "Vote updated");
        assert_eq!(revote.total_votes, 3);
        assert_eq!(revote.user_vote, "b");

        let percentages: Vec<f64> = revote.results.iter().map(|r| r.percentage).collect();
        assert_eq!(percentages, vec![33.3, 66.7, 0.0]);
        let sum: f64 = percentages.iter().sum();
        assert!((sum - 100.0).abs() < 0.2);

        let stored: Feed = store.gen_enforce(&poll).await.unwrap();
        let FeedKind::Poll { votes, .. } = stored.kind else { panic!("not a poll") };
        assert_eq!(votes.iter().filter(|vote| vote.user_id == u1).count(), 1);
    }

    #[tokio::test]
    async fn test_vote_errors() {
        let store = store().await;
        let service = EngagementService::new(store.clone());
        let poll = feed(&store, poll()).await;
        let post = feed(&store, json!({"type": "post", "content": "hi"})).await;
        let user = store.next_id();

        match service.vote(&poll, &user, "z").await.unwrap_err() {
            AppError::BadRequest(message) => assert_eq!(message, "Invalid option ID"),
            other => panic!("unexpected {:?}", other),
        }
        match service.vote(&post, &user, "a").await.unwrap_err() {
            AppError::BadRequest(message) => assert_eq!(message, "This feed is not a poll"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            service.vote(&store.next_id(), &user, "a").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_toggle_like_twice_restores_state() {
        let store = store().await;
        let service = EngagementService::new(store.clone());
        let post = feed(&store, json!({"type": "post", "content": "hi"})).await;
        let user = store.next_id();

        let liked = service.toggle_like(&post, &user).await.unwrap();
        assert!(liked.liked);
        assert_eq!(liked.likes_count, 1);

        let unliked = service.toggle_like(&post, &user).await.unwrap();
        assert!(!unliked.liked);
        assert!(unliked.likes.is_empty());

        assert!(matches!(
            service.toggle_like(&store.next_id(), &user).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_comments_append() {
        let store = store().await;
        let service = EngagementService::new(store.clone());
        let post = feed(&store, json!({"type": "post", "content": "hi"})).await;

        let first = service.add_comment(&post, &store.next_id(), " Nice ").await.unwrap();
        assert_eq!(first.comment.text, "Nice");
        let second = service.add_comment(&post, &store.next_id(), "Agreed").await.unwrap();
        assert_eq!(second.total_comments, 2);

        assert!(service.add_comment(&post, &store.next_id(), "   ").await.is_err());
    }

    #[tokio::test]
    async fn test_review_average_is_rounded() {
        let store = store().await;
        let service = EngagementService::new(store.clone());
        let business = serde_json::from_value::<NewBusiness>(json!({
            "title": "Sharma Tiffins",
            "userId": store.next_id(),
            "societyId": store.next_id(),
            "phone": "+919812345678"
        }))
        .unwrap()
        .into_business(store.next_id(), now())
        .unwrap();
        store.create(&business).await.unwrap();

        for rating in [5, 4, 4] {
            service
                .add_review(
                    ReviewTarget::Business,
                    &business.id,
                    ReviewInput {
                        user_id: store.next_id(),
                        rating,
                        comment: None,
                    },
                )
                .await
                .unwrap();
        }
        let stored: Business = store.gen_enforce(&business.id).await.unwrap();
        assert_eq!(stored.average_rating, 4.33);
        assert_eq!(stored.reviews.len(), 3);

        let err = service
            .add_review(
                ReviewTarget::Business,
                &business.id,
                ReviewInput {
                    user_id: store.next_id(),
                    rating: 6,
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationDetails(..)));

        let err = service
            .add_review(
                ReviewTarget::DailyService,
                &store.next_id(),
                ReviewInput {
                    user_id: store.next_id(),
                    rating: 3,
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
