use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Document;
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;
use crate::models::common::{Report, Review, SubOrder, VerificationStatus};
use crate::models::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    #[default]
    Active,
    Completed,
    Expired,
    Pending,
}

/// `sellingPrice` is what orders are charged; the rest is display data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealPrice {
    #[serde(default)]
    pub mrp: Option<f64>,
    pub selling_price: f64,
    #[serde(default)]
    pub discounted_price: Option<f64>,
    #[serde(default)]
    pub discount_percent: Option<f64>,
    #[serde(default)]
    pub save_amount: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WholesaleDeal {
    pub id: DocId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub society_id: DocId,
    pub user_id: DocId,
    #[serde(default)]
    pub quantity_available: Option<u64>,
    #[serde(default)]
    pub quantity_unit: Option<String>,
    #[serde(default)]
    pub minimum_order_quantity: Option<u32>,
    #[serde(default)]
    pub maximum_order_quantity: Option<u32>,
    #[serde(default)]
    pub current_ordered_qty: u64,
    pub price: DealPrice,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub order_deadline_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub orders: Vec<SubOrder>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub deal_status: DealStatus,
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

impl WholesaleDeal {
    /// Field order amounts are charged against.
    pub const UNIT_PRICE_PATH: &'static str = "price.sellingPrice";
}

impl Document for WholesaleDeal {
    const COLLECTION: Collection = Collection::WholesaleDeals;
    const LABEL: &'static str = "Wholesale deal";

    fn id(&self) -> &DocId {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeal {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub society_id: DocId,
    pub user_id: DocId,
    #[serde(default)]
    pub quantity_available: Option<u64>,
    #[serde(default)]
    pub quantity_unit: Option<String>,
    #[serde(default)]
    pub minimum_order_quantity: Option<u32>,
    #[serde(default)]
    pub maximum_order_quantity: Option<u32>,
    pub price: DealPrice,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub order_deadline_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
}

impl NewDeal {
    pub fn into_deal(self, id: DocId, now: DateTime<Utc>) -> AppResult<WholesaleDeal> {
        let mut validator = Validator::new();
        validator
            .non_blank("title", &self.title)
            .check(
                self.title.trim().chars().count() <= 100,
                "Deal title cannot be more than 100 characters",
            )
            .phone("phone", &self.phone);
        validate_price(&mut validator, &self.price);
        validate_bounds(
            &mut validator,
            self.minimum_order_quantity,
            self.maximum_order_quantity,
        );
        validator.finish()?;

        Ok(WholesaleDeal {
            id,
            title: self.title.trim().to_string(),
            description: self.description,
            phone: self.phone.trim().to_string(),
            images: self.images,
            category: self.category,
            society_id: self.society_id,
            user_id: self.user_id,
            quantity_available: self.quantity_available,
            quantity_unit: self.quantity_unit,
            minimum_order_quantity: self.minimum_order_quantity,
            maximum_order_quantity: self.maximum_order_quantity,
            current_ordered_qty: 0,
            price: self.price,
            order_deadline_date: self.order_deadline_date,
            estimated_delivery_date: self.estimated_delivery_date,
            orders: Vec::new(),
            verification_status: VerificationStatus::Pending,
            deal_status: DealStatus::Active,
            reviews: Vec::new(),
            average_rating: 0.0,
            report: Vec::new(),
            total_report_count: 0,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DealPatch {
    Title(String),
    Description(Option<String>),
    Phone(String),
    Images(Vec<String>),
    Category(Option<String>),
    QuantityAvailable(u64),
    QuantityUnit(Option<String>),
    OrderBounds {
        minimum: Option<u32>,
        maximum: Option<u32>,
    },
    Price(DealPrice),
    OrderDeadlineDate(DateTime<Utc>),
    EstimatedDeliveryDate(DateTime<Utc>),
    VerificationStatus(VerificationStatus),
    DealStatus(DealStatus),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DealPatchRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub images: Option<Vec<String>>,
    pub category: Option<String>,
    pub quantity_available: Option<u64>,
    pub quantity_unit: Option<String>,
    pub minimum_order_quantity: Option<u32>,
    pub maximum_order_quantity: Option<u32>,
    pub price: Option<DealPrice>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub order_deadline_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    pub verification_status: Option<VerificationStatus>,
    pub deal_status: Option<DealStatus>,
}

impl DealPatchRequest {
    pub fn into_patches(self) -> AppResult<Vec<DealPatch>> {
        let mut validator = Validator::new();
        let mut patches = Vec::new();

        if let Some(title) = self.title {
            validator.non_blank("title", &title).check(
                title.trim().chars().count() <= 100,
                "Deal title cannot be more than 100 characters",
            );
            patches.push(DealPatch::Title(title.trim().to_string()));
        }
        if let Some(description) = self.description {
            patches.push(DealPatch::Description(Some(description)));
        }
        if let Some(phone) = self.phone {
            validator.phone("phone", &phone);
            patches.push(DealPatch::Phone(phone.trim().to_string()));
        }
        if let Some(images) = self.images {
            patches.push(DealPatch::Images(images));
        }
        if let Some(category) = self.category {
            patches.push(DealPatch::Category(Some(category)));
        }
        if let Some(quantity) = self.quantity_available {
            validator.check(quantity >= 1, "quantityAvailable must be at least 1");
            patches.push(DealPatch::QuantityAvailable(quantity));
        }
        if let Some(unit) = self.quantity_unit {
            patches.push(DealPatch::QuantityUnit(Some(unit)));
        }
        if self.minimum_order_quantity.is_some() || self.maximum_order_quantity.is_some() {
            validate_bounds(
                &mut validator,
                self.minimum_order_quantity,
                self.maximum_order_quantity,
            );
            patches.push(DealPatch::OrderBounds {
                minimum: self.minimum_order_quantity,
                maximum: self.maximum_order_quantity,
            });
        }
        if let Some(price) = self.price {
            validate_price(&mut validator, &price);
            patches.push(DealPatch::Price(price));
        }
        if let Some(deadline) = self.order_deadline_date {
            patches.push(DealPatch::OrderDeadlineDate(deadline));
        }
        if let Some(delivery) = self.estimated_delivery_date {
            patches.push(DealPatch::EstimatedDeliveryDate(delivery));
        }
        if let Some(status) = self.verification_status {
            patches.push(DealPatch::VerificationStatus(status));
        }
        if let Some(status) = self.deal_status {
            patches.push(DealPatch::DealStatus(status));
        }

        validator.finish()?;
        if patches.is_empty() {
            return Err(AppError::Validation("No updatable fields supplied".to_string()));
        }
        Ok(patches)
    }
}

impl DealPatch {
    pub fn reprices_orders(&self) -> bool {
        matches!(self, DealPatch::Price(_))
    }

    pub fn apply(&self, update: Update) -> AppResult<Update> {
        Ok(match self {
            DealPatch::Title(title) => update.set("title", title.as_str()),
            DealPatch::Description(description) => update.set("description", description.clone()),
            DealPatch::Phone(phone) => update.set("phone", phone.as_str()),
            DealPatch::Images(images) => update.set("images", images.clone()),
            DealPatch::Category(category) => update.set("category", category.clone()),
            DealPatch::QuantityAvailable(quantity) => update.set("quantityAvailable", *quantity),
            DealPatch::QuantityUnit(unit) => update.set("quantityUnit", unit.clone()),
            DealPatch::OrderBounds { minimum, maximum } => {
                let mut update = update;
                if let Some(minimum) = minimum {
                    update = update.set("minimumOrderQuantity", *minimum);
                }
                if let Some(maximum) = maximum {
                    update = update.set("maximumOrderQuantity", *maximum);
                }
                update
            }
            DealPatch::Price(price) => update
                .set("price", serde_json::to_value(price)?)
                .reprice("orders", "quantity", "amount", WholesaleDeal::UNIT_PRICE_PATH),
            DealPatch::OrderDeadlineDate(date) => {
                update.set("orderDeadlineDate", date.timestamp_millis())
            }
            DealPatch::EstimatedDeliveryDate(date) => {
                update.set("estimatedDeliveryDate", date.timestamp_millis())
            }
            DealPatch::VerificationStatus(status) => {
                update.set("verificationStatus", serde_json::to_value(status)?)
            }
            DealPatch::DealStatus(status) => {
                update.set("dealStatus", serde_json::to_value(status)?)
            }
        })
    }
}

fn validate_price(validator: &mut Validator, price: &DealPrice) {
    validator.check(
        price.selling_price.is_finite() && price.selling_price >= 0.0,
        "price.sellingPrice must be a non-negative number",
    );
    for (field, value) in [
        ("mrp", price.mrp),
        ("discountedPrice", price.discounted_price),
        ("discountPercent", price.discount_percent),
        ("saveAmount", price.save_amount),
    ] {
        if let Some(value) = value {
            validator.check(
                value.is_finite() && value >= 0.0,
                format!("price.{} must be a non-negative number", field),
            );
        }
    }
}

fn validate_bounds(validator: &mut Validator, minimum: Option<u32>, maximum: Option<u32>) {
    if let Some(minimum) = minimum {
        validator.check(minimum >= 1, "minimumOrderQuantity must be at least 1");
    }
    if let Some(maximum) = maximum {
        validator.check(maximum >= 1, "maximumOrderQuantity must be at least 1");
    }
    if let (Some(minimum), Some(maximum)) = (minimum, maximum) {
        validator.check(
            minimum <= maximum,
            "minimumOrderQuantity cannot exceed maximumOrderQuantity",
        );
    }
}
