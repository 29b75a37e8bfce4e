//! Serverless transport types.
//!
//! The platform hands the function one JSON event per invocation and
//! expects one JSON response back. Binary bodies travel base64-encoded in
//! both directions.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Inbound invocation event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessEvent {
    pub http_method: String,
    pub path: String,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    /// Unparsed query string, when the platform supplies it.
    #[serde(default)]
    pub raw_query: Option<String>,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl ServerlessEvent {
    /// A single query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .as_ref()
            .and_then(|params| params.get(name))
            .map(String::as_str)
    }

    /// The query string to forward upstream.
    ///
    /// `rawQuery` is passed through verbatim; otherwise the parsed
    /// parameters are re-encoded in a stable order.
    pub fn query_string(&self) -> Option<String> {
        if let Some(raw) = self.raw_query.as_deref().filter(|q| !q.is_empty()) {
            return Some(raw.to_string());
        }

        let params = self.query_string_parameters.as_ref()?;
        if params.is_empty() {
            return None;
        }
        let sorted: BTreeMap<&String, &String> = params.iter().collect();
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sorted)
            .finish();
        Some(encoded)
    }
}

/// Outbound invocation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}
