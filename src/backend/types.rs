use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// A procurement request as stored by the request/search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Row {
    pub fn service_category(&self) -> Option<&str> {
        self.extra
            .get("service_category")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a create-row call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowDraft {
    pub title: String,
    pub constraints: BTreeMap<String, Value>,
    pub project_id: Option<i64>,
    pub is_service: bool,
    pub service_category: Option<String>,
}

impl RowDraft {
    pub fn payload(&self) -> Value {
        let constraints = stringify(&self.constraints);
        let mut payload = json!({
            "title": self.title,
            "status": "sourcing",
            "project_id": self.project_id,
            "is_service": self.is_service,
            "choice_answers": constraints,
            "request_spec": {
                "item_name": self.title,
                "constraints": constraints,
            },
        });
        if let Some(category) = &self.service_category {
            payload["service_category"] = Value::String(category.clone());
        }
        payload
    }
}

/// Body of a patch-row call. `constraints`, when present, replace the
/// stored set wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPatch {
    pub title: Option<String>,
    pub constraints: Option<BTreeMap<String, Value>>,
}

impl RowPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.constraints.is_none()
    }

    pub fn payload(&self) -> Value {
        let mut payload = Map::new();
        let mut spec = Map::new();
        if let Some(title) = &self.title {
            payload.insert("title".into(), Value::String(title.clone()));
            spec.insert("item_name".into(), Value::String(title.clone()));
        }
        if let Some(constraints) = &self.constraints {
            let encoded = stringify(constraints);
            payload.insert("choice_answers".into(), Value::String(encoded.clone()));
            spec.insert("constraints".into(), Value::String(encoded));
        }
        if !spec.is_empty() {
            payload.insert("request_spec".into(), Value::Object(spec));
        }
        Value::Object(payload)
    }
}

fn stringify(constraints: &BTreeMap<String, Value>) -> String {
    serde_json::to_string(constraints).unwrap_or_else(|_| "{}".into())
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
