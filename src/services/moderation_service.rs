// Report intake with a per-user daily quota shared by every reportable kind.

use chrono::{DateTime, Local, NaiveTime};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::entities::{decode, EntityStore};
use crate::error::{AppError, AppResult};
use crate::infrastructure::database::{Collection, UnwindQuery, UnwindSource};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{lookup, Aggregate, ElementFilter, Update};
use crate::models::common::{now, touch, Report};
use crate::models::validation::Validator;

/// Kinds whose reports count toward the daily quota.
const QUOTA_COLLECTIONS: [Collection; 4] = [
    Collection::Feeds,
    Collection::Businesses,
    Collection::DailyServices,
    Collection::WholesaleDeals,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTarget {
    Feed,
    Business,
    DailyService,
    Wholesale,
    User,
}

impl ReportTarget {
    fn collection(&self) -> Collection {
        match self {
            ReportTarget::Feed => Collection::Feeds,
            ReportTarget::Business => Collection::Businesses,
            ReportTarget::DailyService => Collection::DailyServices,
            ReportTarget::Wholesale => Collection::WholesaleDeals,
            ReportTarget::User => Collection::Users,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ReportTarget::Feed => "feed",
            ReportTarget::Business => "business",
            ReportTarget::DailyService => "daily service",
            ReportTarget::Wholesale => "wholesale deal",
            ReportTarget::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    pub total_report_count: u64,
    pub reports: Vec<Report>,
}

#[derive(Clone)]
pub struct ModerationService {
    store: EntityStore,
    daily_limit: u64,
}

impl ModerationService {
    pub fn new(store: EntityStore, daily_limit: u64) -> Self {
        Self { store, daily_limit }
    }

    /// Reports `user_id` filed since local midnight.
    pub async fn reports_today(&self, user_id: &DocId) -> AppResult<u64> {
        let (from, to) = local_day_bounds(Local::now());
        let sources = QUOTA_COLLECTIONS
            .iter()
            .map(|collection| {
                UnwindSource::new(*collection, "report", "createdAt")
                    .where_element("userId", user_id.as_str())
            })
            .collect();
        let query = UnwindQuery::new(sources).within("createdAt", from, to);
        self.store.database().count_unwound(&query).await
    }

    /// Checks run in a fixed order: reason, daily quota, id format, existence, duplicate.
    pub async fn report(
        &self,
        target: ReportTarget,
        entity_id: &str,
        reporter: &DocId,
        reason: &str,
    ) -> AppResult<ReportResult> {
        Validator::new().non_blank("reason", reason).finish()?;

        let filed = self.reports_today(reporter).await?;
        if filed >= self.daily_limit {
            warn!("User {} hit the daily report limit ({})", reporter, self.daily_limit);
            return Err(AppError::TooManyRequests(format!(
                "You can only submit {} reports per day",
                self.daily_limit
            )));
        }

        let entity_id = DocId::parse(entity_id)
            .map_err(|_| AppError::BadRequest(format!("Invalid {} ID", target.label())))?;
        if target == ReportTarget::User && &entity_id == reporter {
            return Err(AppError::BadRequest("You cannot report yourself".to_string()));
        }

        let collection = target.collection();
        let db = self.store.database();
        if db.get(collection, &entity_id).await?.is_none() {
            return Err(AppError::NotFound(format!("{} not found", capitalize(target.label()))));
        }

        let report = Report {
            user_id: reporter.clone(),
            reason: reason.trim().to_string(),
            created_at: now(),
        };
        let update = touch(
            Update::new()
                .when_lacks("report", ElementFilter::eq("userId", reporter.as_str()))
                .push("report", serde_json::to_value(&report)?)
                .recompute("totalReportCount", "report", Aggregate::Count),
            report.created_at,
        );
        let outcome = db.update(collection, &entity_id, &update).await?;
        let document = match (outcome.matched, outcome.document) {
            (true, Some(document)) => document,
            (false, Some(_)) => {
                return Err(AppError::Conflict(format!(
                    "You have already reported this {}",
                    target.label()
                )))
            }
            (_, None) => {
                return Err(AppError::NotFound(format!("{} not found", capitalize(target.label()))))
            }
        };

        let reports: Vec<Report> = match lookup(&document, "report") {
            Some(reports) => decode(reports.clone())?,
            None => Vec::new(),
        };
        let total_report_count = lookup(&document, "totalReportCount")
            .and_then(Value::as_u64)
            .unwrap_or(reports.len() as u64);

        info!(
            "User {} reported {} {} ({} reports)",
            reporter,
            target.label(),
            entity_id,
            total_report_count
        );
        Ok(ReportResult {
            total_report_count,
            reports,
        })
    }
}

/// Epoch-millisecond bounds of the local calendar day containing `at`, both inclusive.
pub fn local_day_bounds(at: DateTime<Local>) -> (i64, i64) {
    let day = at.date_naive();
    let start_of = |date: chrono::NaiveDate| {
        let midnight = date.and_time(NaiveTime::MIN);
        midnight
            .and_local_timezone(Local)
            .earliest()
            .map(|local| local.timestamp_millis())
            .unwrap_or_else(|| midnight.and_utc().timestamp_millis())
    };
    let start = start_of(day);
    let end = day
        .succ_opt()
        .map(|next| start_of(next) - 1)
        .unwrap_or(i64::MAX);
    (start, end)
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::id_generator::IdGenerator;
    use crate::infrastructure::sqlite_database::SqliteDocumentDatabase;
    use crate::models::{NewBusiness, NewDailyService, NewDeal, NewFeed, NewUser};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (EntityStore, ModerationService) {
        let db = SqliteDocumentDatabase::new_in_memory().await.unwrap();
        let store = EntityStore::new(Arc::new(db), Arc::new(IdGenerator::new()));
        let service = ModerationService::new(store.clone(), 3);
        (store, service)
    }

    async fn post(store: &EntityStore) -> DocId {
        let feed = serde_json::from_value::<NewFeed>(json!({
            "type": "post",
            "content": "Lost keys near gate 2",
            "userId": store.next_id(),
            "societyId": store.next_id()
        }))
        .unwrap()
        .into_feed(store.next_id(), now())
        .unwrap();
        store.create(&feed).await.unwrap();
        feed.id
    }

    #[test]
    fn test_local_day_bounds_cover_the_whole_day() {
        let at = Local.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).earliest().unwrap();
        let (from, to) = local_day_bounds(at);
        assert!(from <= at.timestamp_millis() && at.timestamp_millis() <= to);

        let midnight = Local.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).earliest().unwrap();
        assert_eq!(from, midnight.timestamp_millis());
        let next = Local.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).earliest().unwrap();
        assert_eq!(to, next.timestamp_millis() - 1);
        assert!(to - from >= Duration::hours(22).num_milliseconds());
    }

    #[tokio::test]
    async fn test_duplicate_report_conflicts() {
        let (store, service) = setup().await;
        let feed = post(&store).await;
        let reporter = store.next_id();

        let first = service
            .report(ReportTarget::Feed, feed.as_str(), &reporter, "spam")
            .await
            .unwrap();
        assert_eq!(first.total_report_count, 1);
        assert_eq!(first.reports[0].user_id, reporter);

        let err = service
            .report(ReportTarget::Feed, feed.as_str(), &reporter, "spam again")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(service.reports_today(&reporter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fourth_report_of_the_day_is_rejected() {
        let (store, service) = setup().await;
        let reporter = store.next_id();

        for _ in 0..3 {
            let feed = post(&store).await;
            service
                .report(ReportTarget::Feed, feed.as_str(), &reporter, "abusive")
                .await
                .unwrap();
        }

        let helper = serde_json::from_value::<NewDailyService>(json!({
            "name": "Sunita",
            "phone": "+919822222222"
        }))
        .unwrap()
        .into_daily_service(store.next_id(), now())
        .unwrap();
        store.create(&helper).await.unwrap();

        let err = service
            .report(ReportTarget::DailyService, helper.id.as_str(), &reporter, "no show")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_)));

        // Someone else still can.
        service
            .report(ReportTarget::DailyService, helper.id.as_str(), &store.next_id(), "no show")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_quota_is_shared_across_kinds() {
        let (store, service) = setup().await;
        let reporter = store.next_id();

        let business = serde_json::from_value::<NewBusiness>(json!({
            "title": "Sharma Tiffins",
            "userId": store.next_id(),
            "societyId": store.next_id()
        }))
        .unwrap()
        .into_business(store.next_id(), now())
        .unwrap();
        store.create(&business).await.unwrap();
        let deal = serde_json::from_value::<NewDeal>(json!({
            "title": "Alphonso mangoes",
            "phone": "+919811111111",
            "societyId": store.next_id(),
            "userId": store.next_id(),
            "price": {"sellingPrice": 950.0}
        }))
        .unwrap()
        .into_deal(store.next_id(), now())
        .unwrap();
        store.create(&deal).await.unwrap();
        let helper = serde_json::from_value::<NewDailyService>(json!({
            "name": "Sunita",
            "phone": "+919822222222"
        }))
        .unwrap()
        .into_daily_service(store.next_id(), now())
        .unwrap();
        store.create(&helper).await.unwrap();

        for (target, id) in [
            (ReportTarget::Business, &business.id),
            (ReportTarget::Wholesale, &deal.id),
            (ReportTarget::DailyService, &helper.id),
        ] {
            service
                .report(target, id.as_str(), &reporter, "misleading")
                .await
                .unwrap();
        }
        assert_eq!(service.reports_today(&reporter).await.unwrap(), 3);

        let feed = post(&store).await;
        let err = service
            .report(ReportTarget::Feed, feed.as_str(), &reporter, "spam")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TooManyRequests(_)));
    }

    #[tokio::test]
    async fn test_missing_target_and_blank_reason() {
        let (store, service) = setup().await;
        let reporter = store.next_id();

        let err = service
            .report(ReportTarget::Business, store.next_id().as_str(), &reporter, "fake")
            .await
            .unwrap_err();
        match err {
            AppError::NotFound(message) => assert_eq!(message, "Business not found"),
            other => panic!("unexpected {:?}", other),
        }

        let feed = post(&store).await;
        assert!(matches!(
            service.report(ReportTarget::Feed, feed.as_str(), &reporter, "  ").await,
            Err(AppError::ValidationDetails(..))
        ));
        assert!(matches!(
            service.report(ReportTarget::Feed, "not-an-id", &reporter, "spam").await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_user_reports_and_self_report() {
        let (store, service) = setup().await;
        let user = serde_json::from_value::<NewUser>(json!({"phone": "+919833333333"}))
            .unwrap()
            .into_user(store.next_id(), now())
            .unwrap();
        store.create(&user).await.unwrap();

        let result = service
            .report(ReportTarget::User, user.id.as_str(), &store.next_id(), "harassment")
            .await
            .unwrap();
        assert_eq!(result.total_report_count, 1);

        assert!(matches!(
            service.report(ReportTarget::User, user.id.as_str(), &user.id, "me").await,
            Err(AppError::BadRequest(_))
        ));
    }
}
