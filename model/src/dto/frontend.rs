use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::function::FunctionLanguage;

/// Key of the cluster template holding the address of its frontend
pub const EDGE_CLUSTER_FRONTEND: &str = "EDGE_CLUSTER_FRONTEND";

/// Body of `POST /v1/daas/upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct UploadFunctionDaaS {
    pub lang:    FunctionLanguage,
    /// Serialized function, base64
    pub fc:      String,
    /// Acts as the function identity on the frontend side
    pub fc_hash: String,
}

/// One cluster of the list returned by `GET /v1/app_requirements/{id}/ec_fe`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EdgeClusterFrontendResponse {
    pub id:         u64,
    pub name:       String,
    #[serde(default)]
    pub hosts:      Vec<u64>,
    #[serde(default)]
    pub datastores: Vec<u64>,
    #[serde(default)]
    pub vnets:      Vec<u64>,
    #[serde(default)]
    pub template:   Map<String, Value>,
}

impl EdgeClusterFrontendResponse {
    pub fn edge_cluster_address(&self) -> Option<&str> {
        self.template.get(EDGE_CLUSTER_FRONTEND).and_then(Value::as_str)
    }
}
