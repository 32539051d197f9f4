use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Document;
use crate::error::AppResult;
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::models::common::VerificationStatus;
use crate::models::validation::Validator;

/// A resident's request to the society admins, e.g. to be verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub id: DocId,
    pub user_id: DocId,
    #[serde(default)]
    pub status: VerificationStatus,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Document for UserRequest {
    const COLLECTION: Collection = Collection::Requests;
    const LABEL: &'static str = "Request";

    fn id(&self) -> &DocId {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserRequest {
    pub user_id: DocId,
    #[serde(default)]
    pub message: String,
}

impl NewUserRequest {
    pub fn into_request(self, id: DocId, now: DateTime<Utc>) -> AppResult<UserRequest> {
        Validator::new()
            .non_blank("message", &self.message)
            .check(
                self.message.chars().count() <= 1000,
                "Message cannot be more than 1000 characters",
            )
            .finish()?;

        Ok(UserRequest {
            id,
            user_id: self.user_id,
            status: VerificationStatus::Pending,
            message: self.message.trim().to_string(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestStatusUpdate {
    pub status: VerificationStatus,
}
