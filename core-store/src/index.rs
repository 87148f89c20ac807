//! # Search Index
//!
//! Derived in-memory lookup structure over the vehicle table.
//!
//! ## Overview
//!
//! - registration suffix → records with that suffix
//! - chassis trigram → records whose lowercased chassis contains it
//!
//! A chassis query uses the bucket of its first trigram and filters by
//! substring containment inside it. The index is never updated in place: a
//! rebuild assembles a complete [`IndexSnapshot`] and swaps it in under the
//! write lock, so readers always see either the previous snapshot or the new
//! one. Between rebuilds results may be stale.

use core_async::sync::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{IndexStats, VehicleRecord, MIN_CHASSIS_NEEDLE};

/// Immutable index built from one full scan; records are held in id order.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    records: Vec<VehicleRecord>,
    by_suffix: HashMap<String, Vec<u32>>,
    by_trigram: HashMap<String, Vec<u32>>,
}

impl IndexSnapshot {
    /// Build from records sorted by id.
    pub fn build(records: Vec<VehicleRecord>) -> Self {
        let mut by_suffix: HashMap<String, Vec<u32>> = HashMap::new();
        let mut by_trigram: HashMap<String, Vec<u32>> = HashMap::new();

        for (position, record) in records.iter().enumerate() {
            let position = position as u32;

            if let Some(suffix) = &record.registration_suffix {
                by_suffix.entry(suffix.clone()).or_default().push(position);
            }

            if let Some(chassis) = &record.chassis_lower {
                let chars: Vec<char> = chassis.chars().collect();
                let mut seen: Vec<String> = Vec::new();
                for window in chars.windows(MIN_CHASSIS_NEEDLE) {
                    let trigram: String = window.iter().collect();
                    if seen.contains(&trigram) {
                        continue;
                    }
                    by_trigram
                        .entry(trigram.clone())
                        .or_default()
                        .push(position);
                    seen.push(trigram);
                }
            }
        }

        Self {
            records,
            by_suffix,
            by_trigram,
        }
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            records: self.records.len() as u64,
            suffix_keys: self.by_suffix.len() as u64,
            chassis_buckets: self.by_trigram.len() as u64,
        }
    }

    /// Records with exactly this normalized suffix, in id order.
    pub fn by_suffix(&self, suffix: &str, limit: usize) -> Vec<VehicleRecord> {
        self.by_suffix
            .get(suffix)
            .map(|positions| self.collect(positions.iter().copied(), limit))
            .unwrap_or_default()
    }

    /// Records whose lowercased chassis contains the normalized needle, in
    /// id order.
    pub fn by_chassis(&self, needle: &str, limit: usize) -> Vec<VehicleRecord> {
        let bucket_key: String = needle.chars().take(MIN_CHASSIS_NEEDLE).collect();
        let Some(bucket) = self.by_trigram.get(&bucket_key) else {
            return Vec::new();
        };

        let matching = bucket.iter().copied().filter(|&position| {
            self.records[position as usize]
                .chassis_lower
                .as_deref()
                .map(|chassis| chassis.contains(needle))
                .unwrap_or(false)
        });
        self.collect(matching, limit)
    }

    fn collect(&self, positions: impl Iterator<Item = u32>, limit: usize) -> Vec<VehicleRecord> {
        positions
            .take(limit)
            .map(|position| self.records[position as usize].clone())
            .collect()
    }
}

/// Shared handle to the current snapshot, cold until the first rebuild.
#[derive(Debug, Default)]
pub struct SearchIndex {
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().await.clone()
    }

    pub async fn is_warm(&self) -> bool {
        self.snapshot.read().await.is_some()
    }

    pub async fn replace(&self, snapshot: IndexSnapshot) -> IndexStats {
        let stats = snapshot.stats();
        *self.snapshot.write().await = Some(Arc::new(snapshot));
        stats
    }

    /// Drop the snapshot; lookups fall back to table scans until the next
    /// rebuild.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }
}
