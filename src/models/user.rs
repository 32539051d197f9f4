use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Document;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{OrderPointer, Report, VerificationStatus};
use crate::models::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    Resident,
    Business,
    Admin,
}

/// Copy of the selected society's address kept on the user for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocietySnapshot {
    pub name: String,
    pub tower_name: String,
    pub flat_number: String,
    pub pincode: String,
    pub complete_address: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessLink {
    pub business_id: DocId,
    pub verification_status: VerificationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: DocId,
    pub phone: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub roles: Vec<Role>,
    #[serde(default)]
    pub verify_status: VerificationStatus,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub selected_society_id: Option<DocId>,
    #[serde(default)]
    pub selected_society: Option<SocietySnapshot>,
    #[serde(default)]
    pub business_ids: Vec<BusinessLink>,
    #[serde(default)]
    pub orders: Vec<OrderPointer>,
    #[serde(default)]
    pub report: Vec<Report>,
    #[serde(default)]
    pub total_report_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;
    const LABEL: &'static str = "User";

    fn id(&self) -> &DocId {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub phone: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<Role>>,
    #[serde(default)]
    pub profile_photo_url: Option<String>,
    #[serde(default)]
    pub selected_society_id: Option<DocId>,
    #[serde(default)]
    pub selected_society: Option<SocietySnapshot>,
}

impl NewUser {
    pub fn into_user(self, id: DocId, now: DateTime<Utc>) -> AppResult<User> {
        let roles = self.roles.unwrap_or_else(|| vec![Role::Guest]);
        Validator::new()
            .phone("phone", &self.phone)
            .check(!roles.is_empty(), "At least one role is required")
            .check(
                self.full_name.as_deref().map_or(true, |name| name.chars().count() <= 100),
                "Full name cannot be more than 100 characters",
            )
            .finish()?;

        Ok(User {
            id,
            phone: self.phone.trim().to_string(),
            full_name: self.full_name.map(|name| name.trim().to_string()),
            roles: dedup_roles(roles),
            verify_status: VerificationStatus::Pending,
            profile_photo_url: self.profile_photo_url,
            selected_society_id: self.selected_society_id,
            selected_society: self.selected_society,
            business_ids: Vec::new(),
            orders: Vec::new(),
            report: Vec::new(),
            total_report_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

/// The fields a client may change on a user. Orders and reports are owned elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum UserPatch {
    FullName(String),
    ProfilePhotoUrl(Option<String>),
    Roles(Vec<Role>),
    VerifyStatus(VerificationStatus),
    SelectedSociety {
        society_id: DocId,
        snapshot: SocietySnapshot,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserPatchRequest {
    pub full_name: Option<String>,
    pub profile_photo_url: Option<String>,
    pub roles: Option<Vec<Role>>,
    pub verify_status: Option<VerificationStatus>,
    pub selected_society_id: Option<DocId>,
    pub selected_society: Option<SocietySnapshot>,
}

impl UserPatchRequest {
    pub fn into_patches(self) -> AppResult<Vec<UserPatch>> {
        let mut validator = Validator::new();
        let mut patches = Vec::new();

        if let Some(name) = self.full_name {
            validator
                .non_blank("fullName", &name)
                .check(
                    name.chars().count() <= 100,
                    "Full name cannot be more than 100 characters",
                );
            patches.push(UserPatch::FullName(name.trim().to_string()));
        }
        if let Some(url) = self.profile_photo_url {
            let url = url.trim().to_string();
            patches.push(UserPatch::ProfilePhotoUrl((!url.is_empty()).then_some(url)));
        }
        if let Some(roles) = self.roles {
            validator.check(!roles.is_empty(), "At least one role is required");
            patches.push(UserPatch::Roles(dedup_roles(roles)));
        }
        if let Some(status) = self.verify_status {
            patches.push(UserPatch::VerifyStatus(status));
        }
        match (self.selected_society_id, self.selected_society) {
            (Some(society_id), snapshot) => patches.push(UserPatch::SelectedSociety {
                society_id,
                snapshot: snapshot.unwrap_or_default(),
            }),
            (None, Some(_)) => {
                validator.check(false, "selectedSocietyId is required with selectedSociety");
            }
            (None, None) => {}
        }

        validator.finish()?;
        if patches.is_empty() {
            return Err(AppError::Validation("No updatable fields supplied".to_string()));
        }
        Ok(patches)
    }
}

impl UserPatch {
    pub fn apply(&self, update: Update) -> AppResult<Update> {
        Ok(match self {
            UserPatch::FullName(name) => update.set("fullName", name.as_str()),
            UserPatch::ProfilePhotoUrl(url) => update.set("profilePhotoUrl", url.clone()),
            UserPatch::Roles(roles) => update.set("roles", serde_json::to_value(roles)?),
            UserPatch::VerifyStatus(status) => {
                update.set("verifyStatus", serde_json::to_value(status)?)
            }
            UserPatch::SelectedSociety {
                society_id,
                snapshot,
            } => update
                .set("selectedSocietyId", society_id.as_str())
                .set("selectedSociety", serde_json::to_value(snapshot)?),
        })
    }
}

fn dedup_roles(roles: Vec<Role>) -> Vec<Role> {
    let mut unique: Vec<Role> = Vec::with_capacity(roles.len());
    for role in roles {
        if !unique.contains(&role) {
            unique.push(role);
        }
    }
    unique
}
