//! Shipment and carton payloads read from a JSON file.
//!
//! ```json
//! {
//!   "shipments": { "SHP-1": { "reference": "SHP-1", "cartons": ["C1", "C2"] } },
//!   "cartons":   { "C1": { "code": "C1", "position": 1 } }
//! }
//! ```
//!
//! A shipment's `cartons` list holds codes, or carton records with a `code` field; records
//! listed inline are also served by [`PayloadProvider::carton`].

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use printpack_core::contract::PayloadProvider;
use printpack_core::payload::Value;
use serde::Deserialize;
use serde_json::Value as Json;

#[derive(Debug, Default, Deserialize)]
pub struct JsonPayloadProvider {
    #[serde(default)]
    shipments: BTreeMap<String, Json>,
    #[serde(default)]
    cartons: BTreeMap<String, Json>,
}

impl JsonPayloadProvider {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid payload file")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read payload file {path:?}"))?;
        Self::from_json_str(&raw)
    }

    fn listed_cartons(&self, reference: &str) -> impl Iterator<Item = &Json> {
        self.shipments
            .get(reference)
            .and_then(|shipment| shipment.get("cartons"))
            .and_then(Json::as_array)
            .into_iter()
            .flatten()
    }
}

fn carton_code(entry: &Json) -> Option<&str> {
    match entry {
        Json::String(code) => Some(code.as_str()),
        Json::Object(record) => record.get("code").and_then(Json::as_str),
        _ => None,
    }
}

impl PayloadProvider for JsonPayloadProvider {
    fn shipment(&self, reference: &str) -> Option<Value> {
        self.shipments.get(reference).cloned().map(Value::from_json)
    }

    fn carton(&self, code: &str) -> Option<Value> {
        if let Some(carton) = self.cartons.get(code) {
            return Some(Value::from_json(carton.clone()));
        }
        self.shipments
            .keys()
            .flat_map(|reference| self.listed_cartons(reference))
            .find(|entry| entry.is_object() && carton_code(entry) == Some(code))
            .cloned()
            .map(Value::from_json)
    }

    fn shipment_carton_codes(&self, reference: &str) -> Vec<String> {
        self.listed_cartons(reference)
            .filter_map(carton_code)
            .map(str::to_string)
            .collect()
    }
}
