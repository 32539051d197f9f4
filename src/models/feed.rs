use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::entities::Document;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{Comment, Report};
use crate::models::validation::Validator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    /// Defaults to the id when omitted.
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub user_id: DocId,
    pub option_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub voted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rsvp {
    pub id: DocId,
    pub user_id: DocId,
    pub price: f64,
    pub participants: u32,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub registered_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Post,
    Poll,
    Event,
}

impl FeedType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Post => "post",
            FeedType::Poll => "poll",
            FeedType::Event => "event",
        }
    }
}

/// Type-specific payload, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedKind {
    Post {
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Poll {
        #[serde(default)]
        options: Vec<PollOption>,
        #[serde(default)]
        votes: Vec<Vote>,
    },
    #[serde(rename_all = "camelCase")]
    Event {
        #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
        event_date: Option<DateTime<Utc>>,
        #[serde(default)]
        location: Option<String>,
        #[serde(default)]
        rsvps: Vec<Rsvp>,
        #[serde(default)]
        registered_participants: u64,
    },
}

impl FeedKind {
    pub fn feed_type(&self) -> FeedType {
        match self {
            FeedKind::Post { .. } => FeedType::Post,
            FeedKind::Poll { .. } => FeedType::Poll,
            FeedKind::Event { .. } => FeedType::Event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: DocId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub user_id: DocId,
    pub society_id: DocId,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub likes: Vec<DocId>,
    #[serde(default)]
    pub report: Vec<Report>,
    #[serde(default)]
    pub total_report_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: FeedKind,
}

impl Document for Feed {
    const COLLECTION: Collection = Collection::Feeds;
    const LABEL: &'static str = "Feed";

    fn id(&self) -> &DocId {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NewFeedKind {
    Post {
        #[serde(default)]
        content: String,
    },
    Poll {
        #[serde(default)]
        options: Vec<PollOption>,
    },
    #[serde(rename_all = "camelCase")]
    Event {
        #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
        event_date: Option<DateTime<Utc>>,
        #[serde(default)]
        location: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFeed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub user_id: DocId,
    pub society_id: DocId,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(flatten)]
    pub kind: NewFeedKind,
}

impl NewFeed {
    pub fn into_feed(self, id: DocId, now: DateTime<Utc>) -> AppResult<Feed> {
        let mut validator = Validator::new();
        let kind = match self.kind {
            NewFeedKind::Post { content } => {
                validator.non_blank("content", &content);
                FeedKind::Post { content }
            }
            NewFeedKind::Poll { options } => {
                validate_options(&mut validator, &options);
                let options = options
                    .into_iter()
                    .map(|option| PollOption {
                        name: if option.name.trim().is_empty() {
                            option.id.clone()
                        } else {
                            option.name
                        },
                        id: option.id,
                    })
                    .collect();
                FeedKind::Poll {
                    options,
                    votes: Vec::new(),
                }
            }
            NewFeedKind::Event {
                event_date,
                location,
            } => FeedKind::Event {
                event_date,
                location,
                rsvps: Vec::new(),
                registered_participants: 0,
            },
        };
        validator.finish()?;

        Ok(Feed {
            id,
            title: self.title.map(|title| title.trim().to_string()),
            description: self.description.map(|d| d.trim().to_string()),
            user_id: self.user_id,
            society_id: self.society_id,
            images: self.images,
            comments: Vec::new(),
            likes: Vec::new(),
            report: Vec::new(),
            total_report_count: 0,
            created_at: now,
            updated_at: now,
            kind,
        })
    }
}

fn validate_options(validator: &mut Validator, options: &[PollOption]) {
    validator.check(options.len() >= 2, "A poll needs at least two options");
    let mut seen = HashSet::new();
    for option in options {
        validator.non_blank("option id", &option.id).check(
            seen.insert(option.id.as_str()),
            format!("Duplicate poll option id '{}'", option.id),
        );
    }
}

/// Editable feed fields. Author, society, type and the engagement arrays are fixed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPatch {
    Title(Option<String>),
    Description(Option<String>),
    Images(Vec<String>),
    Content(String),
    EventDate(DateTime<Utc>),
    Location(Option<String>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FeedPatchRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub images: Option<Vec<String>>,
    pub content: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub event_date: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

impl FeedPatchRequest {
    pub fn into_patches(self) -> AppResult<Vec<FeedPatch>> {
        let mut validator = Validator::new();
        let mut patches = Vec::new();

        if let Some(title) = self.title {
            patches.push(FeedPatch::Title(Some(title.trim().to_string())));
        }
        if let Some(description) = self.description {
            patches.push(FeedPatch::Description(Some(description.trim().to_string())));
        }
        if let Some(images) = self.images {
            patches.push(FeedPatch::Images(images));
        }
        if let Some(content) = self.content {
            validator.non_blank("content", &content);
            patches.push(FeedPatch::Content(content));
        }
        if let Some(date) = self.event_date {
            patches.push(FeedPatch::EventDate(date));
        }
        if let Some(location) = self.location {
            patches.push(FeedPatch::Location(Some(location)));
        }

        validator.finish()?;
        if patches.is_empty() {
            return Err(AppError::Validation("No updatable fields supplied".to_string()));
        }
        Ok(patches)
    }
}

impl FeedPatch {
    /// Fails when the patch targets a field the feed's type does not have.
    pub fn apply(&self, feed_type: FeedType, update: Update) -> AppResult<Update> {
        let required = match self {
            FeedPatch::Content(_) => Some(FeedType::Post),
            FeedPatch::EventDate(_) | FeedPatch::Location(_) => Some(FeedType::Event),
            _ => None,
        };
        if let Some(required) = required {
            if required != feed_type {
                return Err(AppError::Validation(format!(
                    "Field only applies to {} feeds, this feed is a {}",
                    required.as_str(),
                    feed_type.as_str()
                )));
            }
        }

        Ok(match self {
            FeedPatch::Title(title) => update.set("title", title.clone()),
            FeedPatch::Description(description) => update.set("description", description.clone()),
            FeedPatch::Images(images) => update.set("images", images.clone()),
            FeedPatch::Content(content) => update.set("content", content.as_str()),
            FeedPatch::EventDate(date) => update.set("eventDate", date.timestamp_millis()),
            FeedPatch::Location(location) => update.set("location", location.clone()),
        })
    }
}
