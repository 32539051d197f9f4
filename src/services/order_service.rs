// Order upserts against businesses and wholesale deals.
// Each step is a single-document atomic update; amounts and totals are recomputed from the stored
// quantities and unit price and written as absolute values, so retried or interleaved calls converge.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::entities::{decode, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{lookup, Aggregate, ElementFilter, Update};
use crate::models::common::{now, to_cents, touch, DeliveryInfo, OrderPointer, OrderStatus, SourceType, SubOrder};
use crate::models::{Business, WholesaleDeal};
use crate::services::pointer_sync::PointerSync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderTarget {
    Business,
    Wholesale,
}

impl OrderTarget {
    fn collection(&self) -> Collection {
        match self {
            OrderTarget::Business => Collection::Businesses,
            OrderTarget::Wholesale => Collection::WholesaleDeals,
        }
    }

    fn source_type(&self) -> SourceType {
        match self {
            OrderTarget::Business => SourceType::Business,
            OrderTarget::Wholesale => SourceType::Wholesale,
        }
    }

    fn unit_price_path(&self) -> &'static str {
        match self {
            OrderTarget::Business => Business::UNIT_PRICE_PATH,
            OrderTarget::Wholesale => WholesaleDeal::UNIT_PRICE_PATH,
        }
    }

    fn not_found(&self) -> AppError {
        match self {
            OrderTarget::Business => AppError::NotFound("Business not found".to_string()),
            OrderTarget::Wholesale => AppError::NotFound("Wholesale deal not found".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOrderResult {
    pub order_id: DocId,
    pub quantity: u32,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ordered_qty: Option<u64>,
}

#[derive(Clone)]
pub struct OrderService {
    store: EntityStore,
    pointers: PointerSync,
}

impl OrderService {
    pub fn new(store: EntityStore, pointers: PointerSync) -> Self {
        Self { store, pointers }
    }

    /// Add `quantity` to the user's sub-order on the target, creating it on first order.
    pub async fn upsert_order(
        &self,
        target: OrderTarget,
        entity_id: &DocId,
        user_id: &DocId,
        quantity: u32,
        delivery: DeliveryInfo,
    ) -> AppResult<UpsertOrderResult> {
        if quantity < 1 {
            return Err(AppError::Validation("quantity must be at least 1".to_string()));
        }

        let unit_price = self.unit_price(target, entity_id).await?;
        let collection = target.collection();
        let db = self.store.database();
        let mine = ElementFilter::eq("userId", user_id.as_str());

        let mut settled = None;
        for _ in 0..2 {
            let stamp = now();
            let increment = settle(
                target,
                Update::new()
                    .when_contains("orders", mine.clone())
                    .inc_element("orders", mine.clone(), "quantity", quantity)
                    .set_element("orders", mine.clone(), "updatedAt", stamp.timestamp_millis()),
            );
            let outcome = db.update(collection, entity_id, &touch(increment, stamp)).await?;
            match (outcome.matched, outcome.document) {
                (true, Some(document)) => {
                    settled = Some(document);
                    break;
                }
                (_, None) => return Err(target.not_found()),
                (false, Some(_)) => {}
            }

            let sub_order = SubOrder {
                order_id: self.store.next_id(),
                user_id: user_id.clone(),
                quantity,
                amount: to_cents(quantity as f64 * unit_price),
                status: OrderStatus::Pending,
                ordered_at: stamp,
                updated_at: stamp,
                delivery: delivery.clone(),
            };
            let push = settle(
                target,
                Update::new()
                    .when_lacks("orders", mine.clone())
                    .push("orders", serde_json::to_value(&sub_order)?),
            );
            let outcome = db.update(collection, entity_id, &touch(push, stamp)).await?;
            if let (true, Some(document)) = (outcome.matched, outcome.document) {
                settled = Some(document);
                break;
            }
        }
        let document = settled.ok_or_else(|| {
            AppError::Internal(format!(
                "Could not settle order for user {} on {}",
                user_id, entity_id
            ))
        })?;

        let sub_order = find_sub_order(&document, user_id)?;
        let current_ordered_qty = match target {
            OrderTarget::Wholesale => Some(
                lookup(&document, "currentOrderedQty")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            ),
            OrderTarget::Business => None,
        };

        self.pointers
            .upsert_best_effort(
                user_id,
                &OrderPointer::for_sub_order(target.source_type(), entity_id, &sub_order),
            )
            .await;

        info!(
            "Order upserted on {} {} for user {}: quantity {}",
            target.source_type().as_str(),
            entity_id,
            user_id,
            sub_order.quantity
        );

        Ok(UpsertOrderResult {
            order_id: sub_order.order_id,
            quantity: sub_order.quantity,
            amount: sub_order.amount,
            current_ordered_qty,
        })
    }

    async fn unit_price(&self, target: OrderTarget, entity_id: &DocId) -> AppResult<f64> {
        match target {
            OrderTarget::Wholesale => {
                let deal: WholesaleDeal = self.store.gen_enforce(entity_id).await?;
                Ok(deal.price.selling_price)
            }
            OrderTarget::Business => {
                let business: Business = self.store.gen_enforce(entity_id).await?;
                business.price.ok_or_else(|| {
                    AppError::Validation("Business has no unit price to order against".to_string())
                })
            }
        }
    }
}

/// Price every sub-order from the document's own unit price and, for deals, refresh the total.
fn settle(target: OrderTarget, update: Update) -> Update {
    let update = update.reprice("orders", "quantity", "amount", target.unit_price_path());
    match target {
        OrderTarget::Wholesale => update.recompute(
            "currentOrderedQty",
            "orders",
            Aggregate::Sum {
                field: "quantity".to_string(),
            },
        ),
        OrderTarget::Business => update,
    }
}

fn find_sub_order(document: &Value, user_id: &DocId) -> AppResult<SubOrder> {
    let mine = ElementFilter::eq("userId", user_id.as_str());
    let element = lookup(document, "orders")
        .and_then(Value::as_array)
        .and_then(|orders| orders.iter().find(|order| mine.matches(order)))
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("Sub-order for user {} vanished", user_id)))?;
    decode(element)
}
