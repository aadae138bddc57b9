use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;

/// Raw struct deserialized from yaml
#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub ledger: Option<String>,
    pub materials: Option<String>,
    pub receipts: Option<String>,
    pub session: Option<String>,
    pub catalog: Option<Vec<Material>>,
    pub users: Option<Vec<User>>,
}

#[skip_serializing_none]
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Material {
    pub code: String,
    pub name: Option<String>,
    pub base_unit: String,
    pub units: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub role: String,
    pub password_hash: String,
}
