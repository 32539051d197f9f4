use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Document;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{Report, Review, SubOrder, VerificationStatus};
use crate::models::validation::Validator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: DocId,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub user_id: DocId,
    pub society_id: DocId,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Unit price used to compute order amounts.
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub catalogue: Vec<CatalogueItem>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub orders: Vec<SubOrder>,
    #[serde(default)]
    pub report: Vec<Report>,
    #[serde(default)]
    pub total_report_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// Field order amounts are charged against.
    pub const UNIT_PRICE_PATH: &'static str = "price";
}

impl Document for Business {
    const COLLECTION: Collection = Collection::Businesses;
    const LABEL: &'static str = "Business";

    fn id(&self) -> &DocId {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBusiness {
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub user_id: DocId,
    pub society_id: DocId,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub catalogue: Vec<CatalogueItem>,
}

impl NewBusiness {
    pub fn into_business(self, id: DocId, now: DateTime<Utc>) -> AppResult<Business> {
        let mut validator = Validator::new();
        validator.non_blank("title", &self.title);
        if let Some(phone) = &self.phone {
            validator.phone("phone", phone);
        }
        validate_price(&mut validator, self.price);
        validate_catalogue(&mut validator, &self.catalogue);
        validator.finish()?;

        Ok(Business {
            id,
            title: self.title.trim().to_string(),
            category: self.category,
            description: self.description,
            user_id: self.user_id,
            society_id: self.society_id,
            phone: self.phone,
            images: self.images,
            price: self.price,
            unit: self.unit,
            verification_status: VerificationStatus::Pending,
            rejection_reason: None,
            catalogue: self.catalogue,
            reviews: Vec::new(),
            average_rating: 0.0,
            orders: Vec::new(),
            report: Vec::new(),
            total_report_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusinessPatch {
    Title(String),
    Category(Option<String>),
    Description(Option<String>),
    Phone(Option<String>),
    Images(Vec<String>),
    Price(Option<f64>),
    Unit(Option<String>),
    Catalogue(Vec<CatalogueItem>),
    Verification {
        status: VerificationStatus,
        rejection_reason: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BusinessPatchRequest {
    pub title: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub images: Option<Vec<String>>,
    pub price: Option<f64>,
    pub unit: Option<String>,
    pub catalogue: Option<Vec<CatalogueItem>>,
    pub verification_status: Option<VerificationStatus>,
    pub rejection_reason: Option<String>,
}

impl BusinessPatchRequest {
    pub fn into_patches(self) -> AppResult<Vec<BusinessPatch>> {
        let mut validator = Validator::new();
        let mut patches = Vec::new();

        if let Some(title) = self.title {
            validator.non_blank("title", &title);
            patches.push(BusinessPatch::Title(title.trim().to_string()));
        }
        if let Some(category) = self.category {
            patches.push(BusinessPatch::Category(optional(category)));
        }
        if let Some(description) = self.description {
            patches.push(BusinessPatch::Description(optional(description)));
        }
        if let Some(phone) = self.phone {
            let phone = optional(phone);
            if let Some(phone) = &phone {
                validator.phone("phone", phone);
            }
            patches.push(BusinessPatch::Phone(phone));
        }
        if let Some(images) = self.images {
            patches.push(BusinessPatch::Images(images));
        }
        if let Some(price) = self.price {
            validate_price(&mut validator, Some(price));
            patches.push(BusinessPatch::Price(Some(price)));
        }
        if let Some(unit) = self.unit {
            patches.push(BusinessPatch::Unit(optional(unit)));
        }
        if let Some(catalogue) = self.catalogue {
            validate_catalogue(&mut validator, &catalogue);
            patches.push(BusinessPatch::Catalogue(catalogue));
        }
        match (self.verification_status, self.rejection_reason) {
            (Some(status), reason) => {
                validator.check(
                    status != VerificationStatus::Rejected
                        || reason.as_deref().is_some_and(|r| !r.trim().is_empty()),
                    "rejectionReason is required when rejecting a business",
                );
                let rejection_reason = match status {
                    VerificationStatus::Rejected => reason,
                    _ => None,
                };
                patches.push(BusinessPatch::Verification {
                    status,
                    rejection_reason,
                });
            }
            (None, Some(_)) => {
                validator.check(false, "rejectionReason requires verificationStatus");
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

impl BusinessPatch {
    pub fn apply(&self, update: Update) -> AppResult<Update> {
        Ok(match self {
            BusinessPatch::Title(title) => update.set("title", title.as_str()),
            BusinessPatch::Category(category) => update.set("category", category.clone()),
            BusinessPatch::Description(description) => {
                update.set("description", description.clone())
            }
            BusinessPatch::Phone(phone) => update.set("phone", phone.clone()),
            BusinessPatch::Images(images) => update.set("images", images.clone()),
            BusinessPatch::Price(price) => update
                .set("price", *price)
                .reprice("orders", "quantity", "amount", Business::UNIT_PRICE_PATH),
            BusinessPatch::Unit(unit) => update.set("unit", unit.clone()),
            BusinessPatch::Catalogue(items) => {
                update.set("catalogue", serde_json::to_value(items)?)
            }
            BusinessPatch::Verification {
                status,
                rejection_reason,
            } => update
                .set("verificationStatus", serde_json::to_value(status)?)
                .set("rejectionReason", rejection_reason.clone()),
        })
    }

    pub fn reprices_orders(&self) -> bool {
        matches!(self, BusinessPatch::Price(_))
    }

    /// Verification changes are mirrored onto the owner's `businessIds`.
    pub fn verification_status(&self) -> Option<VerificationStatus> {
        match self {
            BusinessPatch::Verification { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn validate_price(validator: &mut Validator, price: Option<f64>) {
    if let Some(price) = price {
        validator.check(
            price.is_finite() && price >= 0.0,
            "price must be a non-negative number",
        );
    }
}

fn validate_catalogue(validator: &mut Validator, items: &[CatalogueItem]) {
    for item in items {
        validator
            .non_blank("catalogue item name", &item.name)
            .check(
                item.price.is_finite() && item.price >= 0.0,
                format!("catalogue item '{}' must have a non-negative price", item.name),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_business_is_pending() {
        let new: NewBusiness = serde_json::from_value(json!({
            "title": "Fresh Bakes",
            "userId": "64b7f0c2a1b2c3d4e5f60718",
            "societyId": "64b7f0c2a1b2c3d4e5f60719",
            "price": 40.0
        }))
        .unwrap();
        let business = new
            .into_business(DocId::parse("64b7f0c2a1b2c3d4e5f6071a").unwrap(), Utc::now())
            .unwrap();
        assert_eq!(business.verification_status, VerificationStatus::Pending);
        assert_eq!(business.price, Some(40.0));
    }

    #[test]
    fn test_rejection_needs_reason() {
        let request: BusinessPatchRequest =
            serde_json::from_value(json!({"verificationStatus": "rejected"})).unwrap();
        assert!(request.into_patches().is_err());

        let request: BusinessPatchRequest = serde_json::from_value(json!({
            "verificationStatus": "rejected",
            "rejectionReason": "Blurry documents"
        }))
        .unwrap();
        let patches = request.into_patches().unwrap();
        assert_eq!(
            patches[0].verification_status(),
            Some(VerificationStatus::Rejected)
        );
    }

    #[test]
    fn test_orders_and_reports_are_not_patchable() {
        assert!(serde_json::from_value::<BusinessPatchRequest>(json!({"orders": []})).is_err());
        assert!(
            serde_json::from_value::<BusinessPatchRequest>(json!({"totalReportCount": 0})).is_err()
        );
    }
}
