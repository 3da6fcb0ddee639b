use std::collections::HashMap;
use std::sync::LazyLock;

use serde_json::{json, Value};

/// Record type listing every non-hidden, non-deleted asset paired with its
/// master, ordered by asset date.
pub(crate) const ALL_PHOTOS_LIST_TYPE: &str = "CPLAssetAndMasterByAssetDateWithoutHiddenOrDeleted";

/// CloudKit field names requested in every listing query: enough to resolve
/// the filename, the original resource, and the two candidate timestamps.
pub(crate) const DESIRED_KEYS: &[&str] = &[
    "recordName",
    "recordType",
    "recordChangeTag",
    "masterRef",
    "filenameEnc",
    "itemType",
    "resOriginalRes",
    "resOriginalFileType",
    "assetDate",
    "addedDate",
    "isDeleted",
    "isHidden",
];

pub(crate) static DESIRED_KEYS_VALUES: LazyLock<Vec<Value>> = LazyLock::new(|| {
    DESIRED_KEYS
        .iter()
        .map(|k| Value::String((*k).to_string()))
        .collect()
});

/// Page through the whole library in ascending asset-date order starting at
/// `offset`.
pub(crate) fn list_query(offset: u64, page_size: usize, zone_id: &Value) -> Value {
    json!({
        "query": {
            "filterBy": [
                {
                    "fieldName": "startRank",
                    "fieldValue": {"type": "INT64", "value": offset},
                    "comparator": "EQUALS",
                },
                {
                    "fieldName": "direction",
                    "fieldValue": {"type": "STRING", "value": "ASCENDING"},
                    "comparator": "EQUALS",
                },
            ],
            "recordType": ALL_PHOTOS_LIST_TYPE,
        },
        // Each asset comes back as two records (CPLAsset + CPLMaster).
        "resultsLimit": page_size * 2,
        "desiredKeys": &*DESIRED_KEYS_VALUES,
        "zoneID": zone_id,
    })
}

pub(crate) fn indexing_state_query(zone_id: &Value) -> Value {
    json!({
        "query": {"recordType": "CheckIndexingState"},
        "zoneID": zone_id,
    })
}

pub(crate) fn encode_params(params: &HashMap<String, Value>) -> String {
    use std::borrow::Cow;
    let mut pairs: Vec<String> = params
        .iter()
        .map(|(k, v)| {
            let val: Cow<'_, str> = match v {
                Value::String(s) => Cow::Borrowed(s.as_str()),
                Value::Bool(b) => Cow::Owned(b.to_string()),
                Value::Number(n) => Cow::Owned(n.to_string()),
                other => Cow::Owned(other.to_string()),
            };
            format!("{}={}", urlencoding::encode(k), urlencoding::encode(&val))
        })
        .collect();
    pairs.sort();
    pairs.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_params_sorted_and_escaped() {
        let mut params = HashMap::new();
        params.insert("q".to_string(), Value::String("hello world".to_string()));
        params.insert("flag".to_string(), Value::Bool(true));
        params.insert("n".to_string(), json!(7));
        assert_eq!(encode_params(&params), "flag=true&n=7&q=hello%20world");
    }

    #[test]
    fn test_list_query_shape() {
        let zone = json!({"zoneName": "PrimarySync"});
        let q = list_query(200, 100, &zone);
        assert_eq!(q["resultsLimit"], 200);
        assert_eq!(q["query"]["recordType"], ALL_PHOTOS_LIST_TYPE);
        assert_eq!(q["query"]["filterBy"][0]["fieldValue"]["value"], 200);
        assert_eq!(q["zoneID"]["zoneName"], "PrimarySync");
        assert!(q["desiredKeys"]
            .as_array()
            .unwrap()
            .contains(&json!("filenameEnc")));
    }
}
