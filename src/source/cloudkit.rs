use serde::Deserialize;
use serde_json::Value;

/// Body of a `/records/query` reply. Only the record list is read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub records: Vec<Record>,
}

/// One CloudKit record. `fields` stays untyped JSON; the library picks out
/// the handful of keys it needs per record type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    pub record_name: String,
    #[serde(default)]
    pub record_type: String,
    #[serde(default)]
    pub fields: Value,
}

impl Record {
    /// `recordName` of the master this asset record points at.
    pub fn master_ref(&self) -> Option<&str> {
        self.fields["masterRef"]["value"]["recordName"].as_str()
    }
}
