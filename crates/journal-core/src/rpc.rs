//! JSON-RPC 2.0 implementation of [`LedgerGateway`] over hyper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_wire::{Envelope, FullySigned, Pubkey};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::gateway::{AccountFilter, Commitment, KeyedAccount, LedgerGateway, TipMarker};

/// Connection settings for [`RpcGateway`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub commitment: Commitment,
    pub request_timeout: Duration,
    pub confirm_poll_interval: Duration,
    pub confirm_max_polls: u32,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            commitment: Commitment::Confirmed,
            request_timeout: Duration::from_secs(30),
            confirm_poll_interval: Duration::from_millis(500),
            confirm_max_polls: 60,
        }
    }
}

pub struct RpcGateway {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    uri: Uri,
    config: RpcConfig,
    next_id: AtomicU64,
}

impl RpcGateway {
    pub fn new(config: RpcConfig) -> Result<Self, GatewayError> {
        let uri: Uri = config
            .url
            .parse()
            .map_err(|e| GatewayError::Transport(format!("invalid RPC URL {}: {e}", config.url)))?;

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Ok(Self {
            client,
            uri,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn commitment(&self) -> Commitment {
        self.config.commitment
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = request_body(id, method, params);
        debug!(method, id, "rpc request");

        let request = Request::post(self.uri.clone())
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .map_err(|e| GatewayError::Transport(format!("request build failed: {e}")))?;

        let response = tokio::time::timeout(self.config.request_timeout, self.client.request(request))
            .await
            .map_err(|_| GatewayError::Transport(format!("{method} timed out")))?
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| GatewayError::Transport(format!("reading response body: {e}")))?
            .to_bytes();

        if !status.is_success() {
            return Err(GatewayError::Transport(format!(
                "{method} returned HTTP {status}"
            )));
        }

        decode_response(&bytes)
    }

    async fn signature_status(&self, signature: &str) -> Result<Option<SignatureStatus>, GatewayError> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }
}

#[async_trait]
impl LedgerGateway for RpcGateway {
    async fn latest_tip(&self) -> Result<TipMarker, GatewayError> {
        let response: WithContext<BlockhashValue> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": self.config.commitment }]),
            )
            .await?;
        response.value.into_tip()
    }

    async fn account_bytes(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError> {
        let response: WithContext<Option<UiAccount>> = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": self.config.commitment }
                ]),
            )
            .await?;
        response.value.map(|account| account.decode_data()).transpose()
    }

    async fn program_accounts(
        &self,
        program: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<KeyedAccount>, GatewayError> {
        let accounts: Vec<UiKeyedAccount> = self
            .call(
                "getProgramAccounts",
                json!([
                    program.to_string(),
                    {
                        "encoding": "base64",
                        "commitment": self.config.commitment,
                        "filters": filters_json(filters),
                    }
                ]),
            )
            .await?;

        accounts
            .into_iter()
            .map(|keyed| {
                let address = keyed.pubkey.parse::<Pubkey>().map_err(|e| {
                    GatewayError::InvalidResponse(format!("account key {}: {e}", keyed.pubkey))
                })?;
                Ok(KeyedAccount {
                    address,
                    data: keyed.account.decode_data()?,
                })
            })
            .collect()
    }

    async fn estimate_compute_limit(&self, wire_tx: &[u8]) -> Result<u32, GatewayError> {
        let response: WithContext<SimulationValue> = self
            .call(
                "simulateTransaction",
                json!([
                    BASE64.encode(wire_tx),
                    {
                        "encoding": "base64",
                        "sigVerify": false,
                        "replaceRecentBlockhash": false,
                        "commitment": self.config.commitment,
                    }
                ]),
            )
            .await?;
        response.value.units()
    }

    async fn submit_and_confirm(
        &self,
        tx: &Envelope<FullySigned>,
    ) -> Result<String, GatewayError> {
        let signature: String = self
            .call(
                "sendTransaction",
                json!([
                    tx.to_base64(),
                    {
                        "encoding": "base64",
                        "preflightCommitment": self.config.commitment,
                    }
                ]),
            )
            .await?;
        debug!(%signature, "transaction sent");

        for _ in 0..self.config.confirm_max_polls {
            if let Some(status) = self.signature_status(&signature).await? {
                if let Some(err) = status.err {
                    return Err(GatewayError::TransactionFailed {
                        signature,
                        reason: err.to_string(),
                    });
                }
                if status
                    .confirmation_status
                    .is_some_and(|level| self.config.commitment.is_satisfied_by(level))
                {
                    return Ok(signature);
                }
            }
            tokio::time::sleep(self.config.confirm_poll_interval).await;
        }

        warn!(%signature, polls = self.config.confirm_max_polls, "confirmation timed out");
        Err(GatewayError::ConfirmationTimeout {
            signature,
            attempts: self.config.confirm_max_polls,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

fn request_body(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

fn filters_json(filters: &[AccountFilter]) -> Value {
    Value::Array(
        filters
            .iter()
            .map(|f| {
                json!({
                    "memcmp": {
                        "offset": f.offset,
                        "bytes": bs58::encode(&f.bytes).into_string(),
                    }
                })
            })
            .collect(),
    )
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

fn decode_response<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    let envelope: RpcEnvelope<T> = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

    if let Some(err) = envelope.error {
        return Err(GatewayError::Rpc {
            code: err.code,
            message: err.message,
        });
    }
    envelope
        .result
        .ok_or_else(|| GatewayError::InvalidResponse("missing result".into()))
}

#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

impl BlockhashValue {
    fn into_tip(self) -> Result<TipMarker, GatewayError> {
        let blockhash: [u8; 32] = bs58::decode(&self.blockhash)
            .into_vec()
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or_else(|| {
                GatewayError::InvalidResponse(format!("bad blockhash {}", self.blockhash))
            })?;
        Ok(TipMarker {
            blockhash,
            last_valid_block_height: self.last_valid_block_height,
        })
    }
}

#[derive(Deserialize)]
struct UiAccount {
    /// `[payload, encoding]`
    data: (String, String),
}

impl UiAccount {
    fn decode_data(&self) -> Result<Vec<u8>, GatewayError> {
        let (payload, encoding) = &self.data;
        if encoding != "base64" {
            return Err(GatewayError::InvalidResponse(format!(
                "unexpected account encoding {encoding}"
            )));
        }
        BASE64
            .decode(payload)
            .map_err(|e| GatewayError::InvalidResponse(format!("account data: {e}")))
    }
}

#[derive(Deserialize)]
struct UiKeyedAccount {
    pubkey: String,
    account: UiAccount,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulationValue {
    err: Option<Value>,
    logs: Option<Vec<String>>,
    units_consumed: Option<u64>,
}

impl SimulationValue {
    fn units(self) -> Result<u32, GatewayError> {
        if let Some(err) = self.err {
            return Err(GatewayError::SimulationFailed {
                reason: err.to_string(),
                logs: self.logs.unwrap_or_default(),
            });
        }
        let units = self
            .units_consumed
            .ok_or_else(|| GatewayError::InvalidResponse("simulation omitted unitsConsumed".into()))?;
        u32::try_from(units)
            .map_err(|_| GatewayError::InvalidResponse(format!("unitsConsumed {units} overflows u32")))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<Commitment>,
}
