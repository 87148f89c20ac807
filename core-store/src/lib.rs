//! # Local Vehicle Store
//!
//! Durable, keyed record table plus a derived in-memory lookup structure for
//! the hot query paths.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema, migrations and pool configuration ([`db`])
//! - The [`VehicleStore`] repository: idempotent upserts, lookups, and the
//!   seen set used by the mirror sweep
//! - The [`SearchIndex`]: registration suffix and chassis trigram buckets,
//!   rebuilt as a whole and swapped in atomically

pub mod db;
pub mod error;
pub mod index;
pub mod models;
pub mod store;

pub use error::{Result, StoreError};
pub use index::{IndexSnapshot, SearchIndex};
pub use models::{
    normalize_chassis_needle, normalize_registration, normalize_suffix_query,
    registration_suffix, IndexStats, UpsertReport, VehicleRecord, MIN_CHASSIS_NEEDLE, SUFFIX_LEN,
};
pub use store::{SqliteVehicleStore, VehicleStore, DEFAULT_MAX_RESULTS};
