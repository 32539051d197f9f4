use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Document;
use crate::error::AppResult;
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::models::common::{Report, Review, VerificationStatus};
use crate::models::validation::Validator;

/// A helper (maid, cook, driver...) who may serve several societies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyService {
    pub id: DocId,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub society_ids: Vec<DocId>,
    #[serde(default)]
    pub user_ids: Vec<DocId>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub report: Vec<Report>,
    #[serde(default)]
    pub total_report_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Document for DailyService {
    const COLLECTION: Collection = Collection::DailyServices;
    const LABEL: &'static str = "Daily service";

    fn id(&self) -> &DocId {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDailyService {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub society_ids: Vec<DocId>,
    #[serde(default)]
    pub user_ids: Vec<DocId>,
}

impl NewDailyService {
    pub fn validate(&self) -> AppResult<()> {
        Validator::new()
            .non_blank("name", &self.name)
            .phone("phone", &self.phone)
            .finish()
    }

    pub fn into_daily_service(self, id: DocId, now: DateTime<Utc>) -> AppResult<DailyService> {
        self.validate()?;
        Ok(DailyService {
            id,
            name: self.name.trim().to_string(),
            phone: self.phone.trim().to_string(),
            category: self.category,
            description: self.description,
            images: self.images,
            verification_status: VerificationStatus::Pending,
            society_ids: dedup(self.society_ids),
            user_ids: dedup(self.user_ids),
            reviews: Vec::new(),
            average_rating: 0.0,
            report: Vec::new(),
            total_report_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

pub(crate) fn dedup(ids: Vec<DocId>) -> Vec<DocId> {
    let mut unique: Vec<DocId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
