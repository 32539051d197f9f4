// Records embedded in more than one kind of document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::Update;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Pending,
    #[serde(alias = "accepted")]
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Delivered,
    Cancelled,
    /// Event registrations; presence of the RSVP is the whole lifecycle.
    Registered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Wholesale,
    Business,
    Event,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Wholesale => "wholesale",
            SourceType::Business => "business",
            SourceType::Event => "event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub user_id: DocId,
    pub reason: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: DocId,
    pub user_id: DocId,
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryInfo {
    pub address: Option<String>,
    pub tower_name: Option<String>,
    pub flat_number: Option<String>,
    pub phone: Option<String>,
    pub instructions: Option<String>,
}

/// One user's cumulative order against a business or a wholesale deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubOrder {
    pub order_id: DocId,
    pub user_id: DocId,
    pub quantity: u32,
    pub amount: f64,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ordered_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub delivery: DeliveryInfo,
}

/// Denormalized summary kept on `User.orders`, one per (sourceType, sourceId).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPointer {
    pub source_type: SourceType,
    pub source_id: DocId,
    #[serde(default)]
    pub order_id: Option<DocId>,
    pub quantity: u32,
    pub amount: f64,
    pub status: OrderStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl OrderPointer {
    pub fn for_sub_order(source_type: SourceType, source_id: &DocId, order: &SubOrder) -> Self {
        Self {
            source_type,
            source_id: source_id.clone(),
            order_id: Some(order.order_id.clone()),
            quantity: order.quantity,
            amount: order.amount,
            status: order.status,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: DocId,
    pub user_id: DocId,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Current time truncated to the millisecond precision documents are stored with.
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Stamp `updatedAt` on an update.
pub fn touch(update: Update, now: DateTime<Utc>) -> Update {
    update.set("updatedAt", now.timestamp_millis())
}

/// Round a currency amount to cents.
pub fn to_cents(amount: f64) -> f64 {
    crate::infrastructure::update::round_to(amount, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sub_order_wire_format() {
        let order: SubOrder = serde_json::from_value(json!({
            "orderId": "64b7f0c2a1b2c3d4e5f60718",
            "userId": "64b7f0c2a1b2c3d4e5f60719",
            "quantity": 2,
            "amount": 200.0,
            "orderedAt": 1700000000000i64,
            "updatedAt": 1700000000000i64
        }))
        .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.delivery, DeliveryInfo::default());
        assert_eq!(order.ordered_at.timestamp_millis(), 1_700_000_000_000);

        let value = serde_json::to_value(&order).unwrap();
        assert_eq!(value["status"], "pending");
        assert_eq!(value["orderedAt"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_verification_status_accepts_legacy_spelling() {
        let status: VerificationStatus = serde_json::from_value(json!("accepted")).unwrap();
        assert_eq!(status, VerificationStatus::Approved);
        assert_eq!(serde_json::to_value(status).unwrap(), "approved");
    }

    #[test]
    fn test_to_cents() {
        assert_eq!(to_cents(3.0 * 33.333), 100.0);
        assert_eq!(to_cents(19.999), 20.0);
    }
}
