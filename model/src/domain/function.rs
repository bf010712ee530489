use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionLanguage {
    #[serde(rename = "PY")]
    Python,
    #[serde(rename = "C")]
    C,
}

/// A function shipped to the continuum.
///
/// Only what is listed here travels: the code, its parameters and the
/// variables explicitly captured with [`OffloadFunction::capture`]. Nothing
/// from the surrounding program leaks into the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffloadFunction {
    name:     String,
    language: FunctionLanguage,
    params:   Vec<String>,
    body:     String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    captures: BTreeMap<String, Value>,
}

impl OffloadFunction {
    pub fn new(
        language: FunctionLanguage,
        name: impl Into<String>,
        params: &[&str],
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            language,
            params: params.iter().map(|param| param.to_string()).collect(),
            body: body.into(),
            captures: BTreeMap::new(),
        }
    }

    pub fn python(
        name: impl Into<String>,
        params: &[&str],
        body: impl Into<String>,
    ) -> Self {
        Self::new(FunctionLanguage::Python, name, params, body)
    }

    /// Bind a free variable of the body to a value.
    pub fn capture<T: Serialize + ?Sized>(
        mut self,
        name: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        self.captures.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn language(&self) -> FunctionLanguage { self.language }

    pub fn params(&self) -> &[String] { &self.params }

    pub fn arity(&self) -> usize { self.params.len() }

    pub fn body(&self) -> &str { &self.body }

    pub fn captures(&self) -> &BTreeMap<String, Value> { &self.captures }
}
