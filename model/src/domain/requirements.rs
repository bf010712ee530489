use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_FLAVOUR: &str = "Nature";
const KNOWN_FIELDS: [&str; 5] = [
    "FLAVOUR",
    "MAX_LATENCY",
    "MAX_FUNCTION_EXECUTION_TIME",
    "MIN_ENERGY_RENEWABLE_USAGE",
    "GEOLOCATION",
];

#[derive(Debug, thiserror::Error)]
pub enum RequirementsError {
    #[error("The requirements are null")]
    Null,
    #[error("The requirements must be a JSON object, got: {0}")]
    NotAnObject(Value),
    #[error("Unknown requirements field: {0}")]
    UnknownField(String),
    #[error("The requirements are malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("GEOLOCATION is compulsory if MAX_LATENCY is defined")]
    MissingGeolocation,
}

/// What the device asks of the continuum when placing its functions.
///
/// A submission always replaces the whole document on the frontend, fields
/// are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SchedulingRequirements {
    /// Deployment profile, one per use case
    #[serde(default = "default_flavour")]
    pub flavour: String,

    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<u32>,

    /// Seconds
    #[serde(default = "default_max_function_execution_time")]
    pub max_function_execution_time: f64,

    /// Percentage
    #[serde(default = "default_min_energy_renewable_usage")]
    pub min_energy_renewable_usage: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<String>,
}

fn default_flavour() -> String { DEFAULT_FLAVOUR.to_string() }

fn default_max_function_execution_time() -> f64 { 1.0 }

fn default_min_energy_renewable_usage() -> u32 { 80 }

impl Default for SchedulingRequirements {
    fn default() -> Self {
        Self {
            flavour: default_flavour(),
            max_latency: None,
            max_function_execution_time: default_max_function_execution_time(
            ),
            min_energy_renewable_usage: default_min_energy_renewable_usage(),
            geolocation: None,
        }
    }
}

impl SchedulingRequirements {
    pub fn new(flavour: impl Into<String>) -> Self {
        Self { flavour: flavour.into(), ..Default::default() }
    }

    pub fn with_max_latency(mut self, max_latency: u32) -> Self {
        self.max_latency = Some(max_latency);
        self
    }

    pub fn with_max_function_execution_time(mut self, seconds: f64) -> Self {
        self.max_function_execution_time = seconds;
        self
    }

    pub fn with_min_energy_renewable_usage(mut self, percentage: u32) -> Self {
        self.min_energy_renewable_usage = percentage;
        self
    }

    pub fn with_geolocation(mut self, geolocation: impl Into<String>) -> Self {
        self.geolocation = Some(geolocation.into());
        self
    }

    /// Parse a dynamic requirements object, as handed over by the caller.
    ///
    /// Unlike the documents read back from the frontend, keys that are not
    /// part of the model are refused instead of being dropped.
    pub fn from_value(value: Value) -> Result<Self, RequirementsError> {
        let object = match value {
            Value::Null => return Err(RequirementsError::Null),
            Value::Object(ref object) => object,
            other => return Err(RequirementsError::NotAnObject(other)),
        };

        if let Some(key) =
            object.keys().find(|key| !KNOWN_FIELDS.contains(&key.as_str()))
        {
            return Err(RequirementsError::UnknownField(key.clone()));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// A latency bound is meaningless without knowing where the device is.
    pub fn is_geolocation_valid(&self) -> bool {
        match self.max_latency {
            None | Some(0) => true,
            Some(_) => {
                matches!(
                    &self.geolocation,
                    Some(geolocation) if !geolocation.is_empty()
                )
            }
        }
    }

    pub fn validate(&self) -> Result<(), RequirementsError> {
        if self.is_geolocation_valid() {
            Ok(())
        } else {
            Err(RequirementsError::MissingGeolocation)
        }
    }
}
