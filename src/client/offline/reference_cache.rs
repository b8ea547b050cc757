//! # Reference Data Cache
//!
//! Read-through cache for the lookup lists the operation form needs. Every
//! successful refresh writes through to the local store, so the form keeps
//! working offline with the last lists the server sent. The cache is never
//! the source of truth.

use crate::client::api::ReferenceDataSource;
use crate::client::local_db::{keys, LocalDatabase};
use crate::client::offline::ConnectivityOracle;
use crate::shared::models::{Activity, Equipment, EquipmentCategory, Material};
use crate::shared::Result;
use std::sync::Arc;

/// Lookup lists for one form session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    pub activities: Vec<Activity>,
    pub materials: Vec<Material>,
    pub equipment: Vec<Equipment>,
    /// Whether the lists came from the cache rather than the server
    pub from_cache: bool,
}

impl ReferenceData {
    /// Activities that can run on equipment of `category`
    pub fn activities_for(&self, category: EquipmentCategory) -> Vec<&Activity> {
        self.activities
            .iter()
            .filter(|activity| activity.applies_to(category))
            .collect()
    }

    /// Transport equipment, offered as "truck being loaded"
    pub fn trucks(&self) -> Vec<&Equipment> {
        self.equipment
            .iter()
            .filter(|e| e.category == EquipmentCategory::Transport)
            .collect()
    }

    pub fn find_activity(&self, id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    pub fn find_equipment(&self, id: &str) -> Option<&Equipment> {
        self.equipment.iter().find(|e| e.id == id)
    }
}

pub struct ReferenceDataCache {
    source: Arc<dyn ReferenceDataSource>,
    db: LocalDatabase,
}

impl ReferenceDataCache {
    pub fn new(source: Arc<dyn ReferenceDataSource>, db: LocalDatabase) -> Self {
        Self { source, db }
    }

    pub async fn cached_activities(&self) -> Result<Vec<Activity>> {
        Ok(self
            .db
            .get_json(keys::CACHED_ACTIVITIES)
            .await?
            .unwrap_or_default())
    }

    pub async fn cached_materials(&self) -> Result<Vec<Material>> {
        Ok(self
            .db
            .get_json(keys::CACHED_MATERIALS)
            .await?
            .unwrap_or_default())
    }

    pub async fn cached_equipment(&self) -> Result<Vec<Equipment>> {
        Ok(self
            .db
            .get_json(keys::CACHED_EQUIPMENT)
            .await?
            .unwrap_or_default())
    }

    pub async fn refresh_activities(&self) -> Result<Vec<Activity>> {
        let activities = self.source.fetch_activities().await?;
        self.db.put_json(keys::CACHED_ACTIVITIES, &activities).await?;
        tracing::debug!("[CACHE] Cached {} activities", activities.len());
        Ok(activities)
    }

    pub async fn refresh_materials(&self) -> Result<Vec<Material>> {
        let materials = self.source.fetch_materials().await?;
        self.db.put_json(keys::CACHED_MATERIALS, &materials).await?;
        tracing::debug!("[CACHE] Cached {} materials", materials.len());
        Ok(materials)
    }

    pub async fn refresh_equipment(&self) -> Result<Vec<Equipment>> {
        let equipment = self.source.fetch_equipment().await?;
        self.db.put_json(keys::CACHED_EQUIPMENT, &equipment).await?;
        tracing::debug!("[CACHE] Cached {} equipment", equipment.len());
        Ok(equipment)
    }

    /// Refresh everything from the server
    pub async fn refresh_all(&self) -> Result<ReferenceData> {
        let (activities, materials, equipment) = tokio::try_join!(
            self.refresh_activities(),
            self.refresh_materials(),
            self.refresh_equipment()
        )?;

        Ok(ReferenceData {
            activities,
            materials,
            equipment,
            from_cache: false,
        })
    }

    /// Everything from the cache
    pub async fn cached_all(&self) -> Result<ReferenceData> {
        Ok(ReferenceData {
            activities: self.cached_activities().await?,
            materials: self.cached_materials().await?,
            equipment: self.cached_equipment().await?,
            from_cache: true,
        })
    }

    /// Lists for the operation form
    ///
    /// Refreshes when online; any failure on the way, or being offline,
    /// falls back to the cache.
    pub async fn load(&self, connectivity: &dyn ConnectivityOracle) -> Result<ReferenceData> {
        if connectivity.is_online().await {
            match self.refresh_all().await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    tracing::warn!("[CACHE] Refresh failed, using cached reference data: {}", e);
                }
            }
        } else {
            tracing::info!("[CACHE] Offline, using cached reference data");
        }

        self.cached_all().await
    }
}
