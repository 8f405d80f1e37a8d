//! Node collaborator: the one network dependency the core expresses.
//!
//! The trait is the narrow box-fetch / raw-submit surface the protocol
//! consumes; [`HttpNode`] implements it against the public REST API with a
//! blocking client and a caller-configurable timeout. Everything else about
//! the node (signer, compiler, mempool) stays behind other collaborators.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A token held in a chain box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainToken {
    pub token_id: String,
    pub amount: u64,
}

/// A register as the node returns it: either the raw serialized hex, or a
/// wrapper object carrying it under `serializedValue`. The rendered form is
/// never surfaced; [`RegisterBytes::serialized`] is the only accessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterBytes {
    Raw(String),
    #[serde(rename_all = "camelCase")]
    Wrapped {
        serialized_value: String,
    },
}

impl RegisterBytes {
    pub fn serialized(&self) -> &str {
        match self {
            RegisterBytes::Raw(hex) => hex,
            RegisterBytes::Wrapped { serialized_value } => serialized_value,
        }
    }
}

/// An unspent box as fetched from the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBox {
    pub box_id: String,
    pub value: u64,
    pub ergo_tree: String,
    #[serde(default)]
    pub creation_height: u32,
    #[serde(default)]
    pub assets: Vec<ChainToken>,
    #[serde(default)]
    pub additional_registers: HashMap<String, RegisterBytes>,
    /// Raw serialized box bytes, when the endpoint provides them; required
    /// for the signer's `inputsRaw`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<String>,
}

impl ChainBox {
    /// Serialized register hex by name (`"R4"`…), if present.
    pub fn register(&self, name: &str) -> Option<&str> {
        self.additional_registers.get(name).map(RegisterBytes::serialized)
    }
}

/// The box-fetch / raw-submit surface the core consumes.
pub trait NodeApi: Send + Sync {
    fn get_height(&self) -> Result<u32>;

    /// `Ok(None)` when the box does not exist or is already spent.
    fn get_box_by_id(&self, box_id: &str) -> Result<Option<ChainBox>>;

    fn get_unspent_boxes(&self, address: &str, limit: usize) -> Result<Vec<ChainBox>>;

    /// Unspent boxes guarded by a specific script.
    fn get_boxes_by_script(&self, script_hex: &str, limit: usize) -> Result<Vec<ChainBox>>;

    /// Submit a signed transaction; returns the transaction id. Submission
    /// is the canonical linearization point: a conflict here surfaces as
    /// `NodeIo` and callers rebuild against the new head.
    fn submit(&self, signed_tx: &Value) -> Result<String>;
}

/// Blocking REST implementation.
pub struct HttpNode {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpNode {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        if let Some(key) = api_key {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|_| Error::NodeIo("api key is not a valid header value".into()))?;
            headers.insert("api_key", value);
        }
        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::NodeIo(format!("client construction failed: {e}")))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }

    fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::NodeIo(format!("GET {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::NodeIo(format!("GET {url}: {status} - {body}")));
        }
        response
            .json()
            .map_err(|e| Error::NodeIo(format!("GET {url}: bad JSON: {e}")))
    }

    fn parse_boxes(data: Value) -> Result<Vec<ChainBox>> {
        let items = data.get("items").cloned().unwrap_or(data);
        serde_json::from_value(items)
            .map_err(|e| Error::NodeIo(format!("malformed box listing: {e}")))
    }
}

impl NodeApi for HttpNode {
    fn get_height(&self) -> Result<u32> {
        let data = self.get_json("/api/v1/networkState")?;
        data.get("height")
            .and_then(Value::as_u64)
            .map(|h| h as u32)
            .ok_or_else(|| Error::NodeIo("network state carried no height".into()))
    }

    fn get_box_by_id(&self, box_id: &str) -> Result<Option<ChainBox>> {
        let url = format!("{}/api/v1/boxes/{box_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::NodeIo(format!("GET {url}: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::NodeIo(format!("GET {url}: {status} - {body}")));
        }
        response
            .json()
            .map(Some)
            .map_err(|e| Error::NodeIo(format!("GET {url}: bad JSON: {e}")))
    }

    fn get_unspent_boxes(&self, address: &str, limit: usize) -> Result<Vec<ChainBox>> {
        let data =
            self.get_json(&format!("/api/v1/boxes/unspent/byAddress/{address}?limit={limit}"))?;
        Self::parse_boxes(data)
    }

    fn get_boxes_by_script(&self, script_hex: &str, limit: usize) -> Result<Vec<ChainBox>> {
        let data =
            self.get_json(&format!("/api/v1/boxes/unspent/byErgoTree/{script_hex}?limit={limit}"))?;
        Self::parse_boxes(data)
    }

    fn submit(&self, signed_tx: &Value) -> Result<String> {
        let url = format!("{}/api/v1/transactions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(signed_tx)
            .send()
            .map_err(|e| Error::NodeIo(format!("POST {url}: {e}")))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(Error::NodeIo(format!("transaction rejected: {status} - {body}")));
        }
        Ok(body.trim().trim_matches('"').to_string())
    }
}
