// Plain create/read/update/delete over the document models.

pub mod businesses;
pub mod daily_services;
pub mod deals;
pub mod feeds;
pub mod requests;
pub mod societies;
pub mod users;

pub use businesses::BusinessDirectory;
pub use daily_services::{DailyServiceDirectory, DailyServiceList};
pub use deals::{DealDirectory, ExpirySweep};
pub use feeds::FeedDirectory;
pub use requests::RequestDirectory;
pub use societies::SocietyDirectory;
pub use users::UserDirectory;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::entities::EntityStore;
    use crate::infrastructure::id_generator::IdGenerator;
    use crate::infrastructure::sqlite_database::SqliteDocumentDatabase;

    pub async fn store() -> EntityStore {
        let db = SqliteDocumentDatabase::new_in_memory().await.unwrap();
        EntityStore::new(Arc::new(db), Arc::new(IdGenerator::new()))
    }
}
