// One paginated view over every order a user has placed: wholesale sub-orders, business
// sub-orders and event RSVPs. Built from the embedded arrays at read time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{decode, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Collection, UnwindQuery, UnwindSource, UnwoundRow};
use crate::infrastructure::id_generator::DocId;
use crate::models::common::{OrderStatus, SourceType, SubOrder};
use crate::models::feed::{Feed, FeedKind, Rsvp};
use crate::models::wholesale_deal::{DealPrice, DealStatus};
use crate::models::{Business, WholesaleDeal};

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

/// Raw `page`/`limit` query parameters. Out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageRequest {
    pub fn page(&self) -> u64 {
        self.page.filter(|page| *page >= 1).unwrap_or(1) as u64
    }

    pub fn limit(&self) -> u64 {
        match self.limit {
            None => DEFAULT_LIMIT,
            Some(limit) => limit.clamp(1, MAX_LIMIT as i64) as u64,
        }
    }

    pub fn skip(&self) -> u64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// Display fields of the entity an order was placed on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OrderSource {
    #[serde(rename_all = "camelCase")]
    Wholesale {
        id: DocId,
        images: Vec<String>,
        category: Option<String>,
        price: DealPrice,
        deal_status: DealStatus,
        #[serde(with = "chrono::serde::ts_milliseconds_option")]
        estimated_delivery_date: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    Business {
        id: DocId,
        images: Vec<String>,
        category: Option<String>,
        unit: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Event {
        id: DocId,
        images: Vec<String>,
        #[serde(with = "chrono::serde::ts_milliseconds_option")]
        event_date: Option<DateTime<Utc>>,
        location: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedOrder {
    pub source_type: SourceType,
    pub source_id: DocId,
    pub order_id: DocId,
    pub title: String,
    pub amount: f64,
    pub quantity: u32,
    pub status: OrderStatus,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub ordered_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub phone: Option<String>,
    pub source: OrderSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRoster {
    pub event_id: DocId,
    pub title: Option<String>,
    pub registered_participants: u64,
    pub data: Vec<Rsvp>,
    pub meta: PageMeta,
}

#[derive(Clone)]
pub struct UnifiedOrderService {
    store: EntityStore,
}

impl UnifiedOrderService {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    /// Wholesale, business and event orders of `user_id`, newest first.
    pub async fn user_orders(&self, user_id: &DocId, page: PageRequest) -> AppResult<Paged<UnifiedOrder>> {
        self.run(
            vec![
                UnwindSource::new(Collection::WholesaleDeals, "orders", "orderedAt")
                    .where_element("userId", user_id.as_str()),
                UnwindSource::new(Collection::Businesses, "orders", "orderedAt")
                    .where_element("userId", user_id.as_str()),
                rsvp_source(user_id),
            ],
            page,
        )
        .await
    }

    /// Only the event registrations of `user_id`.
    pub async fn events_for_user(&self, user_id: &DocId, page: PageRequest) -> AppResult<Paged<UnifiedOrder>> {
        self.run(vec![rsvp_source(user_id)], page).await
    }

    /// Registrations for one event, most recent first.
    pub async fn event_roster(&self, event_id: &DocId, page: PageRequest) -> AppResult<EventRoster> {
        let feed: Feed = self.store.gen_enforce(event_id).await?;
        let FeedKind::Event {
            mut rsvps,
            registered_participants,
            ..
        } = feed.kind
        else {
            return Err(AppError::BadRequest("This feed is not an event".to_string()));
        };

        rsvps.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        let total = rsvps.len() as u64;
        let data = rsvps
            .into_iter()
            .skip(page.skip() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(EventRoster {
            event_id: feed.id,
            title: feed.title,
            registered_participants,
            data,
            meta: PageMeta {
                total,
                page: page.page(),
                limit: page.limit(),
            },
        })
    }

    async fn run(&self, sources: Vec<UnwindSource>, page: PageRequest) -> AppResult<Paged<UnifiedOrder>> {
        let db = self.store.database();
        let query = UnwindQuery::new(sources);
        let total = db.count_unwound(&query).await?;
        let rows = db
            .unwind(&query.page(page.skip(), page.limit()))
            .await?;

        let data = rows
            .into_iter()
            .map(project)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Paged {
            data,
            meta: PageMeta {
                total,
                page: page.page(),
                limit: page.limit(),
            },
        })
    }
}

fn rsvp_source(user_id: &DocId) -> UnwindSource {
    UnwindSource::new(Collection::Feeds, "rsvps", "registeredAt")
        .where_document("type", "event")
        .where_element("userId", user_id.as_str())
}

fn project(row: UnwoundRow) -> AppResult<UnifiedOrder> {
    match row.collection {
        Collection::WholesaleDeals => {
            let deal: WholesaleDeal = decode(row.document)?;
            let order: SubOrder = decode(row.element)?;
            Ok(UnifiedOrder {
                source_type: SourceType::Wholesale,
                source_id: deal.id.clone(),
                order_id: order.order_id,
                title: deal.title,
                amount: order.amount,
                quantity: order.quantity,
                status: order.status,
                ordered_at: order.ordered_at,
                updated_at: order.updated_at,
                phone: Some(deal.phone),
                source: OrderSource::Wholesale {
                    id: deal.id,
                    images: deal.images,
                    category: deal.category,
                    price: deal.price,
                    deal_status: deal.deal_status,
                    estimated_delivery_date: deal.estimated_delivery_date,
                },
            })
        }
        Collection::Businesses => {
            let business: Business = decode(row.document)?;
            let order: SubOrder = decode(row.element)?;
            Ok(UnifiedOrder {
                source_type: SourceType::Business,
                source_id: business.id.clone(),
                order_id: order.order_id,
                title: business.title,
                amount: order.amount,
                quantity: order.quantity,
                status: order.status,
                ordered_at: order.ordered_at,
                updated_at: order.updated_at,
                phone: business.phone,
                source: OrderSource::Business {
                    id: business.id,
                    images: business.images,
                    category: business.category,
                    unit: business.unit,
                },
            })
        }
        Collection::Feeds => {
            let feed: Feed = decode(row.document)?;
            let rsvp: Rsvp = decode(row.element)?;
            let (event_date, location) = match feed.kind {
                FeedKind::Event {
                    event_date,
                    location,
                    ..
                } => (event_date, location),
                _ => (None, None),
            };
            Ok(UnifiedOrder {
                source_type: SourceType::Event,
                source_id: feed.id.clone(),
                order_id: rsvp.id,
                title: feed.title.unwrap_or_default(),
                amount: rsvp.price,
                quantity: rsvp.participants,
                status: OrderStatus::Registered,
                ordered_at: rsvp.registered_at,
                updated_at: rsvp.updated_at,
                phone: None,
                source: OrderSource::Event {
                    id: feed.id,
                    images: feed.images,
                    event_date,
                    location,
                },
            })
        }
        other => Err(AppError::Internal(format!(
            "Unexpected collection {} in order union",
            other.as_str()
        ))),
    }
}
