//! CMS collection records.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A `module_options` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOption {
    pub id: i64,
    pub name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A `module_option_items` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleItem {
    pub id: i64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub weight: Option<u32>,
}

impl ModuleItem {
    /// Selection weight. Missing or zero weights count as 1.
    pub fn effective_weight(&self) -> u64 {
        match self.weight {
            Some(w) if w > 0 => u64::from(w),
            _ => 1,
        }
    }
}

/// A `module_results` record to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleResult {
    pub options_id: i64,
    pub result_item_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<Value>,
}

impl ModuleResult {
    /// A result tagged with this client's platform.
    pub fn new(options_id: i64, result_item_id: i64) -> Self {
        Self {
            options_id,
            result_item_id,
            device_info: Some(json!({ "platform": "panelkit" })),
        }
    }
}

/// Query parameters for listing module options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsQuery {
    pub filter: Option<Value>,
    pub sort: Option<String>,
    pub limit: Option<u32>,
}

impl OptionsQuery {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push(("filter".to_string(), filter.to_string()));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.clone()));
        }
        // A zero limit means no limit.
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// CMS list/record envelope. A missing or null `data` reads as absent.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: Option<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_weight() {
        let mut item = ModuleItem {
            id: 1,
            label: "a".into(),
            color: None,
            weight: None,
        };
        assert_eq!(item.effective_weight(), 1);
        item.weight = Some(0);
        assert_eq!(item.effective_weight(), 1);
        item.weight = Some(5);
        assert_eq!(item.effective_weight(), 5);
    }

    #[test]
    fn test_item_without_weight_deserializes() {
        let item: ModuleItem = serde_json::from_value(json!({"id": 3, "label": "x"})).unwrap();
        assert_eq!(item.weight, None);
        assert_eq!(item.color, None);
    }

    #[test]
    fn test_query_pairs() {
        let query = OptionsQuery {
            filter: Some(json!({"status": {"_eq": "published"}})),
            sort: Some("-id".into()),
            limit: Some(0),
        };
        let pairs = query.to_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "filter");
        assert_eq!(pairs[0].1, r#"{"status":{"_eq":"published"}}"#);
        assert_eq!(pairs[1], ("sort".to_string(), "-id".to_string()));

        assert!(OptionsQuery::default().to_pairs().is_empty());
    }

    #[test]
    fn test_envelope_without_data() {
        let envelope: DataEnvelope<Vec<ModuleOption>> = serde_json::from_str("{}").unwrap();
        assert!(envelope.data.is_none());
    }
}
