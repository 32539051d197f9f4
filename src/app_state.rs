use std::sync::Arc;

use crate::{
    config::Config,
    entities::EntityStore,
    infrastructure::{
        database::DocumentDatabase, id_generator::IdGenerator, middleware::HasIdentity,
        security::TokenService, sqlite_database::SqliteDocumentDatabase,
    },
    services::{
        directory::{
            BusinessDirectory, DailyServiceDirectory, DealDirectory, FeedDirectory,
            RequestDirectory, SocietyDirectory, UserDirectory,
        },
        EngagementService, ModerationService, OrderService, PointerSync, RsvpService,
        UnifiedOrderService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: EntityStore,
    pub tokens: Arc<TokenService>,
    pub orders: OrderService,
    pub rsvps: RsvpService,
    pub engagement: EngagementService,
    pub unified_orders: UnifiedOrderService,
    pub moderation: ModerationService,
    pub users: UserDirectory,
    pub societies: SocietyDirectory,
    pub businesses: BusinessDirectory,
    pub deals: DealDirectory,
    pub feeds: FeedDirectory,
    pub daily_services: DailyServiceDirectory,
    pub requests: RequestDirectory,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let database = SqliteDocumentDatabase::connect(
            &config.database.url,
            config.database.max_connections,
            config.cache.capacity,
        )
        .await?;
        Ok(Self::with_database(config, Arc::new(database)))
    }

    /// Wire every service over an already-open document store.
    pub fn with_database(config: Config, database: Arc<dyn DocumentDatabase>) -> Self {
        let store = EntityStore::new(database, Arc::new(IdGenerator::new()));
        let pointers = PointerSync::new(store.clone());

        Self {
            tokens: Arc::new(TokenService::new(&config.auth.jwt_secret)),
            orders: OrderService::new(store.clone(), pointers.clone()),
            rsvps: RsvpService::new(store.clone(), pointers.clone()),
            engagement: EngagementService::new(store.clone()),
            unified_orders: UnifiedOrderService::new(store.clone()),
            moderation: ModerationService::new(
                store.clone(),
                config.moderation.daily_report_limit,
            ),
            users: UserDirectory::new(store.clone()),
            societies: SocietyDirectory::new(store.clone()),
            businesses: BusinessDirectory::new(store.clone(), pointers.clone()),
            deals: DealDirectory::new(store.clone(), pointers.clone()),
            feeds: FeedDirectory::new(store.clone(), pointers),
            daily_services: DailyServiceDirectory::new(store.clone()),
            requests: RequestDirectory::new(store.clone()),
            store,
            config,
        }
    }
}

impl HasIdentity for AppState {
    fn token_service(&self) -> &TokenService {
        &self.tokens
    }

    fn document_store(&self) -> &Arc<dyn DocumentDatabase> {
        self.store.database()
    }
}
