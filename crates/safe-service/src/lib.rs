//! safe-service
//!
//! Minimal, blocking HTTP client for the Safe Transaction Service.
//! Endpoints used:
//! - GET  /safes/{address}/                                   (nonce, owners, threshold)
//! - POST /safes/{address}/multisig-transactions/             (propose)
//! - GET  /multisig-transactions/{safeTxHash}/                (status)
//! - POST /multisig-transactions/{safeTxHash}/confirmations/  (confirm)
//!
//! The base URL must include the API version prefix, e.g.
//! `https://safe-transaction-mainnet.safe.global/api/v1/`.

use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Prefix of the rejection message the service returns when its own
/// recomputed `contractTransactionHash` disagrees with the submitted one.
const HASH_MISMATCH_MARKER: &str = "Contract-transaction-hash=";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("url parse: {0}")]
    Url(#[from] url::ParseError),
    #[error("service rejected request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Connection failures, timeouts and 5xx answers are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ServiceError::Rejected { status, .. } => *status >= 500 || *status == 429,
            ServiceError::Url(_) | ServiceError::Decode(_) => false,
        }
    }

    /// True when the service refused a proposal because it computed a
    /// different transaction hash than the one supplied.
    pub fn is_hash_mismatch(&self) -> bool {
        match self {
            ServiceError::Rejected { body, .. } => {
                body.contains(HASH_MISMATCH_MARKER) && body.contains("does not match")
            }
            _ => false,
        }
    }

    /// Hash the service claims to have computed, if the rejection carries one.
    pub fn reported_hash(&self) -> Option<String> {
        let ServiceError::Rejected { body, .. } = self else {
            return None;
        };
        let start = body.find(HASH_MISMATCH_MARKER)? + HASH_MISMATCH_MARKER.len();
        let candidate = body.get(start..start + 66)?;
        let is_hash = candidate.starts_with("0x")
            && candidate[2..].chars().all(|c| c.is_ascii_hexdigit());
        is_hash.then(|| candidate.to_ascii_lowercase())
    }
}

#[derive(Clone)]
pub struct SafeServiceClient {
    base: Url,
    client: Client,
}

impl SafeServiceClient {
    /// Create a new client. `base` like "https://safe-transaction-mainnet.safe.global/api/v1/".
    pub fn new(base: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let normalized = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let base = Url::parse(&normalized)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// GET /safes/{address}/
    pub fn safe_info(&self, safe: &str) -> Result<SafeInfo, ServiceError> {
        let url = self.base.join(&format!("safes/{safe}/"))?;
        debug!(target: "safe_service", "GET {url}");
        let resp = self.client.get(url).send()?;
        let resp = Self::ensure_success(resp)?;
        resp.json()
            .map_err(|e| ServiceError::Decode(format!("safe info: {e}")))
    }

    /// POST /safes/{address}/multisig-transactions/
    ///
    /// The service answers `201 Created` with an empty body on success.
    pub fn propose_transaction(
        &self,
        safe: &str,
        request: &ProposeTransactionRequest,
    ) -> Result<(), ServiceError> {
        let url = self
            .base
            .join(&format!("safes/{safe}/multisig-transactions/"))?;
        debug!(
            target: "safe_service",
            "POST {url} contractTransactionHash={}",
            request.contract_transaction_hash
        );
        let resp = self.client.post(url).json(request).send()?;
        Self::ensure_success(resp).map(|_| ())
    }

    /// GET /multisig-transactions/{safeTxHash}/
    pub fn multisig_transaction(
        &self,
        safe_tx_hash: &str,
    ) -> Result<MultisigTransaction, ServiceError> {
        let url = self
            .base
            .join(&format!("multisig-transactions/{safe_tx_hash}/"))?;
        debug!(target: "safe_service", "GET {url}");
        let resp = self.client.get(url).send()?;
        let resp = Self::ensure_success(resp)?;
        resp.json()
            .map_err(|e| ServiceError::Decode(format!("multisig transaction: {e}")))
    }

    /// POST /multisig-transactions/{safeTxHash}/confirmations/
    pub fn confirm_transaction(
        &self,
        safe_tx_hash: &str,
        signature: &str,
    ) -> Result<(), ServiceError> {
        #[derive(Serialize)]
        struct Req<'a> {
            signature: &'a str,
        }

        let url = self
            .base
            .join(&format!("multisig-transactions/{safe_tx_hash}/confirmations/"))?;
        debug!(target: "safe_service", "POST {url}");
        let resp = self.client.post(url).json(&Req { signature }).send()?;
        Self::ensure_success(resp).map(|_| ())
    }

    fn ensure_success(resp: Response) -> Result<Response, ServiceError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(ServiceError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Subset of `GET /safes/{address}/` the proposal flow relies on.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeInfo {
    pub address: String,
    #[serde(deserialize_with = "number_or_string")]
    pub nonce: u64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub threshold: u64,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Request body for proposing a multisig transaction.
///
/// Addresses are EIP-55 checksummed, numeric fields are decimal strings and
/// `data` is lowercase `0x` hex (or `null` for an empty payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeTransactionRequest {
    pub to: String,
    pub value: String,
    pub data: Option<String>,
    pub operation: u8,
    pub safe_tx_gas: String,
    pub base_gas: String,
    pub gas_price: String,
    pub gas_token: String,
    pub refund_receiver: String,
    pub nonce: u64,
    pub contract_transaction_hash: String,
    pub sender: String,
    pub signature: String,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigTransaction {
    pub safe: String,
    pub to: String,
    #[serde(deserialize_with = "number_or_string")]
    pub nonce: u64,
    pub safe_tx_hash: String,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub confirmations_required: Option<u64>,
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub owner: String,
    #[serde(default)]
    pub signature: Option<String>,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const SAFE: &str = "0x5AFE3855358E112B5647B952709E6165e1c1eEEe";

    fn sample_request() -> ProposeTransactionRequest {
        ProposeTransactionRequest {
            to: "0x40A2aCCbd92BCA938b02010E17A5b8929b49130D".into(),
            value: "0".into(),
            data: Some("0x8d80ff0a".into()),
            operation: 1,
            safe_tx_gas: "0".into(),
            base_gas: "0".into(),
            gas_price: "0".into(),
            gas_token: "0x0000000000000000000000000000000000000000".into(),
            refund_receiver: "0x0000000000000000000000000000000000000000".into(),
            nonce: 7,
            contract_transaction_hash: format!("0x{}", "ab".repeat(32)),
            sender: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
            signature: format!("0x{}", "11".repeat(65)),
            origin: Some("harvest".into()),
        }
    }

    #[test]
    fn deserialize_safe_info_fixture() {
        let info: SafeInfo =
            serde_json::from_str(include_str!("../tests/fixtures/safe_info.json")).unwrap();
        assert_eq!(info.nonce, 12);
        assert_eq!(info.threshold, 2);
        assert_eq!(info.owners.len(), 3);
    }

    #[test]
    fn safe_info_accepts_string_nonce() {
        let info: SafeInfo = serde_json::from_value(json!({
            "address": SAFE,
            "nonce": "41",
            "threshold": "1",
            "owners": []
        }))
        .unwrap();
        assert_eq!(info.nonce, 41);
        assert_eq!(info.threshold, 1);
    }

    #[test]
    fn safe_info_hits_versioned_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path(format!("/api/v1/safes/{SAFE}/"));
            then.status(200)
                .header("content-type", "application/json")
                .body(include_str!("../tests/fixtures/safe_info.json"));
        });
        let client =
            SafeServiceClient::new(&server.url("/api/v1"), Duration::from_secs(5)).unwrap();
        let info = client.safe_info(SAFE).expect("safe info");
        mock.assert();
        assert_eq!(info.nonce, 12);
    }

    #[test]
    fn propose_posts_camel_case_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/api/v1/safes/{SAFE}/multisig-transactions/"))
                .json_body_partial(
                    json!({
                        "safeTxGas": "0",
                        "operation": 1,
                        "nonce": 7,
                        "origin": "harvest"
                    })
                    .to_string(),
                );
            then.status(201);
        });
        let client =
            SafeServiceClient::new(&server.url("/api/v1/"), Duration::from_secs(5)).unwrap();
        client
            .propose_transaction(SAFE, &sample_request())
            .expect("propose");
        mock.assert();
    }

    #[test]
    fn propose_rejection_preserves_body() {
        let server = MockServer::start();
        let body = json!({
            "nonFieldErrors": ["Signer=0x1234 is not an owner or delegate"]
        })
        .to_string();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/api/v1/safes/{SAFE}/multisig-transactions/"));
            then.status(422).body(body.clone());
        });
        let client =
            SafeServiceClient::new(&server.url("/api/v1/"), Duration::from_secs(5)).unwrap();
        let err = client
            .propose_transaction(SAFE, &sample_request())
            .unwrap_err();
        mock.assert();
        match &err {
            ServiceError::Rejected { status, body } => {
                assert_eq!(*status, 422);
                assert!(body.contains("not an owner"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!err.is_transient());
        assert!(!err.is_hash_mismatch());
    }

    #[test]
    fn hash_mismatch_is_recognised_and_parsed() {
        let reported = format!("0x{}", "CD".repeat(32));
        let err = ServiceError::Rejected {
            status: 422,
            body: format!(
                "{{\"nonFieldErrors\":[\"Contract-transaction-hash={reported} does not match provided contract-tx-hash=0x{}\"]}}",
                "ab".repeat(32)
            ),
        };
        assert!(err.is_hash_mismatch());
        assert_eq!(err.reported_hash(), Some(reported.to_ascii_lowercase()));
    }

    #[test]
    fn server_errors_are_transient() {
        let err = ServiceError::Rejected {
            status: 503,
            body: "maintenance".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.reported_hash(), None);
    }

    #[test]
    fn confirm_posts_signature() {
        let server = MockServer::start();
        let hash = format!("0x{}", "ef".repeat(32));
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path(format!("/api/v1/multisig-transactions/{hash}/confirmations/"))
                .json_body(json!({ "signature": "0xdead" }));
            then.status(201);
        });
        let client =
            SafeServiceClient::new(&server.url("/api/v1/"), Duration::from_secs(5)).unwrap();
        client.confirm_transaction(&hash, "0xdead").expect("confirm");
        mock.assert();
    }

    #[test]
    fn multisig_transaction_status_decodes() {
        let server = MockServer::start();
        let hash = format!("0x{}", "ef".repeat(32));
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path(format!("/api/v1/multisig-transactions/{hash}/"));
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "safe": SAFE,
                        "to": SAFE,
                        "nonce": "3",
                        "safeTxHash": hash,
                        "isExecuted": false,
                        "confirmationsRequired": 2,
                        "confirmations": [{ "owner": SAFE, "signature": "0x00" }]
                    })
                    .to_string(),
                );
        });
        let client =
            SafeServiceClient::new(&server.url("/api/v1/"), Duration::from_secs(5)).unwrap();
        let tx = client.multisig_transaction(&hash).expect("status");
        mock.assert();
        assert_eq!(tx.nonce, 3);
        assert_eq!(tx.confirmations.len(), 1);
        assert_eq!(tx.confirmations_required, Some(2));
    }
}
