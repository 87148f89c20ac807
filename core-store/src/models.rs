//! Domain models for the local vehicle store

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Number of trailing registration characters used for suffix lookup.
pub const SUFFIX_LEN: usize = 4;

/// Shortest chassis needle accepted by substring lookup.
pub const MIN_CHASSIS_NEEDLE: usize = 3;

// =============================================================================
// Vehicle record
// =============================================================================

/// One synced vehicle, keyed by the server-assigned id.
///
/// `registration_suffix` and `chassis_lower` are derived; use
/// [`VehicleRecord::normalized`] after setting the source fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
pub struct VehicleRecord {
    pub id: String,
    pub registration_number: Option<String>,
    pub registration_suffix: Option<String>,
    pub chassis_number: Option<String>,
    pub chassis_lower: Option<String>,
    pub loan_number: Option<String>,
    pub bank: Option<String>,
    pub make: Option<String>,
    pub customer_name: Option<String>,
    pub address: Option<String>,
    pub category: Option<String>,
    /// Remote collection the record was pulled from
    pub collection: Option<String>,
    /// Server modification timestamp, verbatim
    pub updated_at: Option<String>,
}

impl VehicleRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_registration(mut self, registration: impl Into<String>) -> Self {
        self.registration_number = Some(registration.into());
        self
    }

    pub fn with_chassis(mut self, chassis: impl Into<String>) -> Self {
        self.chassis_number = Some(chassis.into());
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Trim text fields, drop empty ones and recompute derived columns.
    pub fn normalized(mut self) -> Self {
        self.id = self.id.trim().to_string();
        for field in [
            &mut self.registration_number,
            &mut self.chassis_number,
            &mut self.loan_number,
            &mut self.bank,
            &mut self.make,
            &mut self.customer_name,
            &mut self.address,
            &mut self.category,
            &mut self.collection,
            &mut self.updated_at,
        ] {
            *field = clean(field.take());
        }

        self.registration_suffix = self
            .registration_number
            .as_deref()
            .and_then(registration_suffix);
        self.chassis_lower = self.chassis_number.as_deref().map(str::to_lowercase);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Record id cannot be empty".to_string());
        }

        let expected = self
            .registration_number
            .as_deref()
            .and_then(registration_suffix);
        if self.registration_suffix != expected {
            return Err("Registration suffix does not match registration number".to_string());
        }

        Ok(())
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Normalization
// =============================================================================

/// Registration with ASCII whitespace removed, uppercased.
pub fn normalize_registration(registration: &str) -> String {
    registration
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Last four characters of the normalized registration, if it has at least
/// four.
pub fn registration_suffix(registration: &str) -> Option<String> {
    let normalized: Vec<char> = normalize_registration(registration).chars().collect();
    if normalized.len() < SUFFIX_LEN {
        return None;
    }
    Some(normalized[normalized.len() - SUFFIX_LEN..].iter().collect())
}

/// Normalized suffix query, or `None` unless exactly four characters remain.
pub fn normalize_suffix_query(query: &str) -> Option<String> {
    let normalized = normalize_registration(query);
    (normalized.chars().count() == SUFFIX_LEN).then_some(normalized)
}

/// Lowercased, trimmed chassis needle, or `None` when shorter than
/// [`MIN_CHASSIS_NEEDLE`].
pub fn normalize_chassis_needle(needle: &str) -> Option<String> {
    let normalized = needle.trim().to_lowercase();
    (normalized.chars().count() >= MIN_CHASSIS_NEEDLE).then_some(normalized)
}

// =============================================================================
// Reports
// =============================================================================

/// Outcome of one upsert batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Rows inserted or changed
    pub written: u64,
    /// Rows already identical to the incoming record
    pub unchanged: u64,
    /// Records that failed validation or their statement
    pub rejected: u64,
    /// Ids now present locally with the incoming values (written + unchanged)
    pub accepted_ids: Vec<String>,
}

impl UpsertReport {
    pub fn accepted(&self) -> u64 {
        self.written + self.unchanged
    }

    pub fn merge(&mut self, other: UpsertReport) {
        self.written += other.written;
        self.unchanged += other.unchanged;
        self.rejected += other.rejected;
        self.accepted_ids.extend(other.accepted_ids);
    }
}

/// Shape of a freshly built search index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub records: u64,
    pub suffix_keys: u64,
    pub chassis_buckets: u64,
}
