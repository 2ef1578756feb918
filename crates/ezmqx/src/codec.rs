// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload codecs keyed by data model id.
//!
//! A [`Codec`] turns a [`DataObject`] into wire bytes and back. Codecs are
//! produced from model source files by a [`CodecLoader`] and stored in a
//! [`CodecRegistry`] owned by the Context.
//!
//! The built-in [`JsonModelLoader`] reads model files of the form
//!
//! ```json
//! { "id": "GTC_Robot_0.0.1", "sections": ["Model", "Sample"] }
//! ```
//!
//! and encodes objects as JSON, rejecting data sections the model does not
//! declare.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed model: {0}")]
    Model(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

/// One sample: device, timestamp and named data sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    pub device_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl DataObject {
    pub fn new(device_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: timestamp.into(),
            data: BTreeMap::new(),
        }
    }

    /// Builder: add a data section.
    pub fn with_data(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.data.get(name)
    }
}

/// Encoder/decoder for one data model.
pub trait Codec: Send + Sync {
    /// Data model id this codec serves.
    fn model_id(&self) -> &str;

    fn encode(&self, object: &DataObject) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<DataObject, CodecError>;

    /// Human-readable document form of an object.
    fn render(&self, object: &DataObject) -> Result<String, CodecError>;
}

/// Parses a model source into a codec.
pub trait CodecLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Codec>, CodecError>;
}

#[derive(Debug, Deserialize)]
struct JsonModel {
    id: String,
    #[serde(default)]
    sections: Vec<String>,
}

/// JSON codec for a model declaring a fixed set of data sections.
#[derive(Debug, Clone)]
pub struct JsonModelCodec {
    id: String,
    sections: Vec<String>,
}

impl JsonModelCodec {
    /// A codec for `id`; an empty `sections` list accepts any section.
    pub fn new(id: impl Into<String>, sections: Vec<String>) -> Self {
        Self {
            id: id.into(),
            sections,
        }
    }

    fn check_sections(&self, object: &DataObject) -> Result<(), String> {
        if self.sections.is_empty() {
            return Ok(());
        }
        match object.data.keys().find(|k| !self.sections.contains(k)) {
            Some(name) => Err(format!("section '{}' not declared by model {}", name, self.id)),
            None => Ok(()),
        }
    }
}

impl Codec for JsonModelCodec {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn encode(&self, object: &DataObject) -> Result<Vec<u8>, CodecError> {
        self.check_sections(object).map_err(CodecError::Encode)?;
        serde_json::to_vec(object).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<DataObject, CodecError> {
        let object: DataObject =
            serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
        self.check_sections(&object).map_err(CodecError::Decode)?;
        Ok(object)
    }

    fn render(&self, object: &DataObject) -> Result<String, CodecError> {
        serde_json::to_string_pretty(object).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

/// Loads [`JsonModelCodec`]s from JSON model files.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModelLoader;

impl CodecLoader for JsonModelLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Codec>, CodecError> {
        let content = std::fs::read_to_string(path)?;
        let model: JsonModel =
            serde_json::from_str(&content).map_err(|e| CodecError::Model(e.to_string()))?;
        if model.id.trim().is_empty() {
            return Err(CodecError::Model(format!(
                "{}: model id is empty",
                path.display()
            )));
        }
        Ok(Arc::new(JsonModelCodec::new(model.id, model.sections)))
    }
}

/// Model id → codec. Entries are only added; first registration wins.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Insert unless the id is taken. Returns the codec's model id.
    pub fn insert(&mut self, codec: Arc<dyn Codec>) -> String {
        let id = codec.model_id().to_string();
        self.codecs.entry(id.clone()).or_insert(codec);
        id
    }

    pub fn get(&self, model_id: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.get(model_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    pub fn clear(&mut self) {
        self.codecs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn robot_codec() -> JsonModelCodec {
        JsonModelCodec::new("GTC_Robot_0.0.1", vec!["Model".into(), "Sample".into()])
    }

    #[test]
    fn encode_decode_preserves_object() {
        let codec = robot_codec();
        let object = DataObject::new("GTC001", "123456789")
            .with_data("Model", json!({"ctname": "Model_107.113.97.248"}))
            .with_data("Sample", json!({"Appearance": "Red", "Weight": 3.5}));

        let bytes = codec.encode(&object).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, object);
        assert_eq!(decoded.get("Sample").unwrap()["Appearance"], "Red");
    }

    #[test]
    fn undeclared_section_is_rejected() {
        let codec = robot_codec();
        let object = DataObject::new("GTC001", "1").with_data("Unknown", json!(1));
        assert!(matches!(codec.encode(&object), Err(CodecError::Encode(_))));

        let bytes = serde_json::to_vec(&object).unwrap();
        assert!(matches!(codec.decode(&bytes), Err(CodecError::Decode(_))));
        assert!(matches!(codec.decode(b"not json"), Err(CodecError::Decode(_))));
    }

    #[test]
    fn loader_reads_model_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"id": "Sensor_1.0", "sections": ["Reading"]}}"#).unwrap();

        let codec = JsonModelLoader.load(file.path()).unwrap();
        assert_eq!(codec.model_id(), "Sensor_1.0");

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"sections": []}}"#).unwrap();
        assert!(matches!(JsonModelLoader.load(bad.path()), Err(CodecError::Model(_))));
    }

    #[test]
    fn registry_first_registration_wins() {
        let mut registry = CodecRegistry::default();
        let first: Arc<dyn Codec> = Arc::new(robot_codec());
        let second: Arc<dyn Codec> = Arc::new(JsonModelCodec::new("GTC_Robot_0.0.1", vec![]));

        assert_eq!(registry.insert(first), "GTC_Robot_0.0.1");
        assert_eq!(registry.insert(second), "GTC_Robot_0.0.1");
        assert_eq!(registry.len(), 1);

        // The kept codec is the first one: it still rejects undeclared sections.
        let kept = registry.get("GTC_Robot_0.0.1").unwrap();
        let object = DataObject::new("d", "t").with_data("Other", json!(0));
        assert!(kept.encode(&object).is_err());
        assert!(registry.get("missing").is_none());
    }
}
