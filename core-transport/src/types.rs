//! Wire types for the vehicle service.
//!
//! Field names on the wire vary between endpoints and server versions, so
//! every vehicle field accepts its known aliases. Records are decoded one by
//! one: a malformed element is counted and skipped instead of failing the
//! whole page.

use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

// ============================================================================
// Vehicle records
// ============================================================================

/// A vehicle record as served by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteVehicle {
    #[serde(alias = "_id", default, deserialize_with = "string_or_number")]
    pub id: Option<String>,

    #[serde(alias = "regNo", default, deserialize_with = "string_or_number")]
    pub registration_number: Option<String>,

    #[serde(alias = "chassisNo", default, deserialize_with = "string_or_number")]
    pub chassis_number: Option<String>,

    #[serde(
        alias = "loanNo",
        alias = "agreementNo",
        default,
        deserialize_with = "string_or_number"
    )]
    pub loan_number: Option<String>,

    #[serde(alias = "bankName", default, deserialize_with = "string_or_number")]
    pub bank: Option<String>,

    #[serde(alias = "model", default, deserialize_with = "string_or_number")]
    pub make: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub customer_name: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub address: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub category: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub collection: Option<String>,

    #[serde(default, deserialize_with = "string_or_number")]
    pub updated_at: Option<String>,
}

impl RemoteVehicle {
    /// Non-empty identifier, if present.
    pub fn record_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Loosely typed servers send numeric registration, loan or agreement
/// numbers; they are kept as their decimal text. `null` reads as absent.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => id_from_value(&value).map(Some).ok_or_else(|| {
            de::Error::invalid_type(Unexpected::Other("non-scalar value"), &"a string or number")
        }),
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Records decoded from one response, with the count of rejected elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapedPage {
    pub records: Vec<RemoteVehicle>,
    pub rejected: u64,
    /// Server-reported total for the query, when provided.
    pub total: Option<u64>,
    /// Upload timestamp reported alongside per-file pages.
    pub remote_updated_at: Option<String>,
}

impl ShapedPage {
    pub fn from_values(values: Vec<Value>) -> Self {
        let mut page = ShapedPage::default();
        for value in values {
            match serde_json::from_value::<RemoteVehicle>(value) {
                Ok(record) if record.record_id().is_some() => page.records.push(record),
                Ok(_) => {
                    warn!("Dropping vehicle record without identifier");
                    page.rejected += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Dropping malformed vehicle record");
                    page.rejected += 1;
                }
            }
        }
        page
    }

    /// Number of elements the server sent, accepted or not.
    pub fn received(&self) -> u64 {
        self.records.len() as u64 + self.rejected
    }
}

// ============================================================================
// Listings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

/// One page of remote identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdPage {
    pub ids: Vec<String>,
}

/// A server-side upload file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    #[serde(alias = "fileName", alias = "filename")]
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(alias = "recordCount", alias = "total", default)]
    pub total_records: u64,
    #[serde(alias = "uploadedAt", default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListing {
    pub files: Vec<RemoteFile>,
    pub page: u64,
    pub total: Option<u64>,
    pub total_pages: Option<u64>,
}

impl FileListing {
    /// Whether another listing page should be requested after this one.
    pub fn has_more(&self, page_size: usize) -> bool {
        match self.total_pages {
            Some(total_pages) => self.page < total_pages,
            None => !self.files.is_empty() && self.files.len() >= page_size,
        }
    }
}

// ============================================================================
// Response envelopes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Pagination {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatsEnvelope {
    #[serde(default)]
    pub collections: Vec<CollectionStats>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IdsEnvelope {
    #[serde(default)]
    pub ids: Vec<Value>,
}

impl IdsEnvelope {
    pub fn into_page(self) -> IdPage {
        let mut ids = Vec::with_capacity(self.ids.len());
        for value in &self.ids {
            match id_from_value(value) {
                Some(id) if !id.trim().is_empty() => ids.push(id),
                _ => warn!("Skipping unusable identifier in id listing"),
            }
        }
        IdPage { ids }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FilesEnvelope {
    #[serde(default)]
    pub data: Vec<RemoteFile>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadDetails {
    #[serde(alias = "recordCount", default)]
    pub total_records: Option<u64>,
    #[serde(alias = "uploadedAt", default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileRecordsEnvelope {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub upload_details: Option<UploadDetails>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ByIdsBody<'a> {
    pub ids: &'a [String],
    pub collection: &'a str,
}
