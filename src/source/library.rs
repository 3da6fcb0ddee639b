use std::collections::HashMap;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::cloudkit::{QueryResponse, Record};
use super::error::SourceError;
use super::queries::{encode_params, indexing_state_query, list_query};
use super::session::Session;
use super::{ContentStream, RemoteItem, RemoteSource};
use crate::retry::{retry_with_backoff, RetryConfig, RetryFailure};
use crate::types::DateSource;

const PAGE_SIZE: usize = 100;

/// UTI → extension, used only to name assets that arrive without a filename.
const ITEM_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("public.heic", "HEIC"),
    ("public.heif", "HEIF"),
    ("public.jpeg", "JPG"),
    ("public.png", "PNG"),
    ("com.apple.quicktime-movie", "MOV"),
    ("com.adobe.raw-image", "DNG"),
];

/// The "All Photos" listing of the primary iCloud library.
pub struct PhotoLibrary {
    session: Box<dyn Session>,
    service_endpoint: String,
    params: HashMap<String, Value>,
    zone_id: Value,
    date_source: DateSource,
}

impl std::fmt::Debug for PhotoLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoLibrary")
            .field("service_endpoint", &self.service_endpoint)
            .field("date_source", &self.date_source)
            .finish_non_exhaustive()
    }
}

impl PhotoLibrary {
    /// Open the primary library, verifying that indexing has finished.
    ///
    /// The indexing check is retried like any other request; a rejected
    /// session or an unfinished index ends it immediately.
    pub async fn open(
        session: Box<dyn Session>,
        service_endpoint: String,
        mut params: HashMap<String, Value>,
        date_source: DateSource,
        retry: &RetryConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, RetryFailure<SourceError>> {
        params.insert("remapEnums".to_string(), Value::Bool(true));
        params.insert("getCurrentSyncToken".to_string(), Value::Bool(true));

        let library = Self {
            session,
            service_endpoint,
            params,
            zone_id: json!({"zoneName": "PrimarySync"}),
            date_source,
        };

        retry_with_backoff(
            retry,
            cancel,
            "indexing-state",
            SourceError::retry_action,
            |_| library.check_indexing(),
        )
        .await?;
        Ok(library)
    }

    async fn check_indexing(&self) -> Result<(), SourceError> {
        let url = self.query_url();
        let response = self
            .session
            .post_json(&url, &indexing_state_query(&self.zone_id))
            .await?;
        let query: QueryResponse = parse_response(&url, response)?;
        let indexing_state = query
            .records
            .first()
            .and_then(|r| r.fields["state"]["value"].as_str())
            .unwrap_or("");
        if indexing_state != "FINISHED" {
            return Err(SourceError::IndexingNotFinished);
        }
        Ok(())
    }

    fn query_url(&self) -> String {
        format!(
            "{}/records/query?{}",
            self.service_endpoint,
            encode_params(&self.params)
        )
    }
}

#[async_trait::async_trait]
impl RemoteSource for PhotoLibrary {
    async fn list_items(&self) -> Result<Vec<RemoteItem>, SourceError> {
        let url = self.query_url();
        let mut items = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let body = list_query(offset, PAGE_SIZE, &self.zone_id);
            let response = self.session.post_json(&url, &body).await?;
            let page: QueryResponse = parse_response(&url, response)?;

            let mut asset_records: HashMap<String, Record> = HashMap::new();
            let mut master_records: Vec<Record> = Vec::new();
            for rec in page.records {
                match rec.record_type.as_str() {
                    "CPLAsset" => {
                        if let Some(master_id) = rec.master_ref() {
                            asset_records.insert(master_id.to_string(), rec);
                        }
                    }
                    "CPLMaster" => master_records.push(rec),
                    other => debug!("Ignoring record type {}", other),
                }
            }

            if master_records.is_empty() {
                break;
            }
            debug!(
                "Listing page at offset {}: {} masters",
                offset,
                master_records.len()
            );

            for master in master_records {
                offset += 1;
                let Some(asset) = asset_records.remove(&master.record_name) else {
                    debug!("Master {} has no asset record, skipping", master.record_name);
                    continue;
                };
                if let Some(item) = decode_item(&master, &asset, self.date_source) {
                    items.push(item);
                }
            }
        }

        Ok(items)
    }

    async fn open_content(&self, item: &RemoteItem) -> Result<ContentStream, SourceError> {
        let response = self.session.get(&item.download_url).await?;
        let url = item.download_url.clone();
        Ok(response
            .bytes_stream()
            .map_err(move |e| SourceError::Http {
                url: url.clone(),
                source: e,
            })
            .boxed())
    }
}

fn parse_response(url: &str, response: Value) -> Result<QueryResponse, SourceError> {
    serde_json::from_value(response).map_err(|e| SourceError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Build a [`RemoteItem`] from a master/asset record pair. Returns `None`
/// when the master carries no downloadable original.
fn decode_item(master: &Record, asset: &Record, date_source: DateSource) -> Option<RemoteItem> {
    let original = &master.fields["resOriginalRes"]["value"];
    let Some(download_url) = original["downloadURL"].as_str() else {
        warn!("Asset {} has no original download URL, skipping", master.record_name);
        return None;
    };

    let filename = decode_filename(&master.fields).unwrap_or_else(|| {
        let item_type = master.fields["itemType"]["value"].as_str().unwrap_or("");
        fingerprint_filename(&master.record_name, item_type)
    });

    let date_field = match date_source {
        DateSource::Created => "assetDate",
        DateSource::Added => "addedDate",
    };
    let timestamp = asset.fields[date_field]["value"]
        .as_f64()
        .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
        .unwrap_or_else(|| {
            warn!("Asset {} is missing {}, using epoch", master.record_name, date_field);
            DateTime::<Utc>::UNIX_EPOCH
        });

    Some(RemoteItem {
        id: master.record_name.clone(),
        filename,
        size: original["size"].as_u64().unwrap_or(0),
        timestamp,
        download_url: download_url.to_string(),
    })
}

/// Decode `filenameEnc`, which is either a plain string or base64 bytes.
fn decode_filename(fields: &Value) -> Option<String> {
    let enc = &fields["filenameEnc"];
    let value = enc["value"].as_str()?;
    match enc["type"].as_str().unwrap_or("STRING") {
        "STRING" => Some(value.to_string()),
        "ENCRYPTED_BYTES" => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(value)
                .ok()?;
            String::from_utf8(decoded).ok()
        }
        other => {
            warn!("Unsupported filenameEnc type: {}", other);
            None
        }
    }
}

/// Name an asset that has no filename: record id with non-alphanumerics
/// replaced, truncated to 12 chars, plus an extension from its UTI.
fn fingerprint_filename(record_name: &str, item_type: &str) -> String {
    let fingerprint: String = record_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(12)
        .collect();
    let ext = ITEM_TYPE_EXTENSIONS
        .iter()
        .find(|(uti, _)| *uti == item_type)
        .map(|(_, ext)| *ext)
        .unwrap_or("unknown");
    format!("{}.{}", fingerprint, ext)
}
