//! Wallet-backed signer: the external signing service, reached over the
//! node wallet API.

use reqwest::blocking::Client;
use serde_json::{json, Value};

use nightpool_core::error::{Error, Result};
use nightpool_core::{SigningHints, TxSigner};

pub struct WalletSigner {
    base_url: String,
    client: Client,
}

impl WalletSigner {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: std::time::Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(key) = api_key {
            let value = reqwest::header::HeaderValue::from_str(key)
                .map_err(|_| Error::NodeIo("api key is not a valid header value".into()))?;
            headers.insert("api_key", value);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::NodeIo(format!("signer client construction failed: {e}")))?;
        Ok(Self { base_url: base_url.trim_end_matches('/').to_string(), client })
    }
}

impl TxSigner for WalletSigner {
    fn sign(
        &self,
        unsigned_tx: &Value,
        inputs_raw: &[String],
        hints: &SigningHints,
    ) -> Result<Value> {
        let url = format!("{}/wallet/transaction/sign", self.base_url);
        let body = json!({
            "tx": unsigned_tx,
            "inputsRaw": inputs_raw,
            "secrets": {
                "dlog": hints.dlog.iter().map(|s| json!({"secret": s})).collect::<Vec<_>>(),
                "dht": hints.dht.iter().map(|hint| json!({
                    "secret": hint.secret,
                    "g": hint.g,
                    "h": hint.h,
                    "u": hint.u,
                    "v": hint.v,
                })).collect::<Vec<_>>(),
            },
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| Error::NodeIo(format!("POST {url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(Error::NodeIo(format!("signing failed: {status} - {detail}")));
        }
        response.json().map_err(|e| Error::NodeIo(format!("signer returned bad JSON: {e}")))
    }
}
