use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::contest::{Entity, EntityId};

pub const DEFAULT_BASELINE: f64 = 1500.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedEntity {
    pub name: String,
    pub rating: f64,
    pub played: u32,
}

/// Ratings for one competition. Entities are added on first sight and never removed.
///
/// Backed by a `BTreeMap` so snapshots and ranked tables come out in a stable order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingStore {
    baseline: f64,
    entities: BTreeMap<EntityId, RatedEntity>,
}

impl Default for RatingStore {
    fn default() -> Self {
        Self::new(DEFAULT_BASELINE)
    }
}

impl RatingStore {
    pub fn new(baseline: f64) -> Self {
        Self {
            baseline,
            entities: BTreeMap::new(),
        }
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn get(&self, id: &EntityId) -> f64 {
        self.entities
            .get(id)
            .map(|e| e.rating)
            .unwrap_or(self.baseline)
    }

    pub fn set(&mut self, id: &EntityId, rating: f64) {
        match self.entities.get_mut(id) {
            Some(entry) => entry.rating = rating,
            None => {
                self.entities.insert(
                    id.clone(),
                    RatedEntity {
                        name: id.to_string(),
                        rating,
                        played: 0,
                    },
                );
            }
        }
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn entity(&self, id: &EntityId) -> Option<&RatedEntity> {
        self.entities.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &RatedEntity)> {
        self.entities.iter()
    }

    /// Registers the entity if unseen and returns its current rating.
    pub(crate) fn touch(&mut self, entity: &Entity) -> f64 {
        let baseline = self.baseline;
        let entry = self
            .entities
            .entry(entity.id.clone())
            .or_insert_with(|| RatedEntity {
                name: entity.display_name().to_string(),
                rating: baseline,
                played: 0,
            });
        if entry.name == entity.id.as_str() && !entity.name.trim().is_empty() {
            entry.name = entity.name.clone();
        }
        entry.rating
    }

    pub(crate) fn record_played(&mut self, id: &EntityId) {
        if let Some(entry) = self.entities.get_mut(id) {
            entry.played = entry.played.saturating_add(1);
        }
    }

    /// Highest rating first; equal ratings fall back to id order.
    pub fn ranked(&self) -> Vec<(&EntityId, &RatedEntity)> {
        let mut rows: Vec<_> = self.entities.iter().collect();
        rows.sort_by(|a, b| b.1.rating.total_cmp(&a.1.rating).then(a.0.cmp(b.0)));
        rows
    }

    pub fn total_rating(&self) -> f64 {
        self.entities.values().map(|e| e.rating).sum()
    }
}

pub fn load_snapshot(path: &Path) -> Result<RatingStore> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("read rating snapshot {}", path.display()))?;
    serde_json::from_str(&raw).context("parse rating snapshot")
}

pub fn save_snapshot(store: &RatingStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create snapshot dir")?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(store).context("serialize rating snapshot")?;
    fs::write(&tmp, json).context("write rating snapshot")?;
    fs::rename(&tmp, path).context("swap rating snapshot")?;
    Ok(())
}
