use tracing::info;

use crate::entities::{Document, EntityStore};
use crate::error::AppResult;
use crate::infrastructure::id_generator::DocId;
use crate::models::common::now;
use crate::models::society::{NewSociety, Society};
use crate::models::User;

#[derive(Clone)]
pub struct SocietyDirectory {
    store: EntityStore,
}

impl SocietyDirectory {
    pub fn new(store: EntityStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, new: NewSociety) -> AppResult<Society> {
        let society = new.into_society(self.store.next_id(), now())?;
        self.store.create(&society).await?;
        info!("Created society {} ({})", society.id, society.name);
        Ok(society)
    }

    pub async fn get(&self, id: &DocId) -> AppResult<Society> {
        self.store.gen_enforce(id).await
    }

    pub async fn list(&self) -> AppResult<Vec<Society>> {
        self.store.gen_all(&Society::query().sort_asc("name")).await
    }

    /// Users holding the resident role, optionally only those of one society.
    pub async fn total_residents(&self, society_id: Option<&DocId>) -> AppResult<u64> {
        let mut query = User::query().has_member("roles", "resident");
        if let Some(society_id) = society_id {
            query = query.eq("selectedSocietyId", society_id.as_str());
        }
        self.store.count(&query).await
    }
}
