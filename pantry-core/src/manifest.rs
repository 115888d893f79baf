//! Manifest model and parsing
//!
//! A manifest is a JSON descriptor of one installable app or driver. The
//! engine only interprets the identifying fields; every other field is
//! carried through untouched so downstream consumers see the document the
//! source published.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind tag of a manifest, fixing which per-kind collection it lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    App,
    Driver,
}

impl ManifestKind {
    /// Name of the per-kind index collection
    pub fn collection(&self) -> &'static str {
        match self {
            ManifestKind::App => "apps",
            ManifestKind::Driver => "drivers",
        }
    }
}

impl fmt::Display for ManifestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestKind::App => write!(f, "app"),
            ManifestKind::Driver => write!(f, "driver"),
        }
    }
}

/// One parsed manifest document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Unique name within the index
    pub name: String,

    /// App or driver
    #[serde(rename = "type")]
    pub kind: ManifestKind,

    /// Remaining descriptor fields, preserved verbatim
    #[serde(flatten)]
    pub descriptor: Map<String, Value>,
}

impl Manifest {
    /// Decode a raw manifest document. Anything beyond "parses as the
    /// expected shape" is deliberately not checked here.
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// The JSON document that gets published to the index
    pub fn to_document(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
