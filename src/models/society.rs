use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Document;
use crate::error::AppResult;
use crate::infrastructure::database::Collection;
use crate::infrastructure::id_generator::DocId;
use crate::models::validation::Validator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Society {
    pub id: DocId,
    pub name: String,
    #[serde(default)]
    pub total_flats: Option<u32>,
    #[serde(default)]
    pub maintenance_charge: Option<f64>,
    #[serde(default)]
    pub towers: Vec<String>,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Document for Society {
    const COLLECTION: Collection = Collection::Societies;
    const LABEL: &'static str = "Society";

    fn id(&self) -> &DocId {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSociety {
    pub name: String,
    #[serde(default)]
    pub total_flats: Option<u32>,
    #[serde(default)]
    pub maintenance_charge: Option<f64>,
    #[serde(default)]
    pub towers: Vec<String>,
    #[serde(default)]
    pub pincode: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl NewSociety {
    pub fn into_society(self, id: DocId, now: DateTime<Utc>) -> AppResult<Society> {
        let mut validator = Validator::new();
        validator.non_blank("name", &self.name);
        if let Some(pincode) = &self.pincode {
            validator.check(
                pincode.len() == 6 && pincode.chars().all(|c| c.is_ascii_digit()),
                format!("{} is not a valid pincode", pincode),
            );
        }
        if let Some(charge) = self.maintenance_charge {
            validator.check(
                charge.is_finite() && charge >= 0.0,
                "maintenanceCharge must be a non-negative number",
            );
        }
        validator.finish()?;

        Ok(Society {
            id,
            name: self.name.trim().to_string(),
            total_flats: self.total_flats,
            maintenance_charge: self.maintenance_charge,
            towers: self
                .towers
                .into_iter()
                .map(|tower| tower.trim().to_string())
                .filter(|tower| !tower.is_empty())
                .collect(),
            pincode: self.pincode,
            address: self.address,
            city: self.city,
            state: self.state,
            created_at: now,
            updated_at: now,
        })
    }
}
