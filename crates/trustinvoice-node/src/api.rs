//! HTTP API server for the TrustInvoice node.
//!
//! Exposes the settlement engine's operations (create, pay, release, refund,
//! details, overdue, switch chain) plus health and status endpoints.
//! Invoices are addressed as `{chain}/{contract}/{key}`: registry address and
//! invoice hash on EVM chains, application id and invoice id on Algorand.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use trustinvoice_core::{Blockchain, CreateInvoiceParams, InvoiceRef, UnifiedInvoice};
use trustinvoice_settlement::{LocalSigner, SettlementError};

use crate::state::NodeState;

// --- Request / response types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub invoice_id: String,
    pub recipient: String,
    /// Minor units (wei, token base units, microAlgos).
    pub amount: u128,
    pub due_date: u64,
    #[serde(default)]
    pub description: String,
    pub blockchain: Blockchain,
    #[serde(default)]
    pub is_escrow: bool,
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub app_id: Option<u64>,
    /// Hex seed of the creator's devnet key. Used for this request only.
    pub seed: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SignerRequest {
    /// Hex seed of the caller's devnet key. Used for this request only.
    pub seed: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SwitchChainRequest {
    pub blockchain: Blockchain,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TxResponse {
    pub tx_id: String,
    pub explorer_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverdueResponse {
    pub invoice: String,
    pub overdue: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChainResponse {
    pub active: Blockchain,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub active_chain: Blockchain,
    pub supported_chains: Vec<Blockchain>,
    pub operator: String,
    pub cached_invoices: usize,
    /// Transactions submitted but not yet included, across all ledgers.
    pub pending_transactions: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status and machine-readable kind for an engine error.
pub fn classify(err: &SettlementError) -> (StatusCode, &'static str) {
    match err {
        SettlementError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        SettlementError::Unauthorized(_) => (StatusCode::FORBIDDEN, "unauthorized"),
        SettlementError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        SettlementError::AdapterNotFound(_) => (StatusCode::NOT_FOUND, "adapter_not_found"),
        SettlementError::AlreadyPaid(_) => (StatusCode::CONFLICT, "already_paid"),
        SettlementError::NotEscrowed(_) => (StatusCode::CONFLICT, "not_escrowed"),
        SettlementError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        SettlementError::Chain { .. } => (StatusCode::BAD_GATEWAY, "chain"),
    }
}

fn api_error(err: SettlementError) -> ApiError {
    let (status, kind) = classify(&err);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            kind: kind.into(),
        }),
    )
}

fn signer(seed: &str) -> Result<LocalSigner, ApiError> {
    LocalSigner::from_hex(seed)
        .map_err(|e| api_error(SettlementError::Validation(format!("invalid seed: {}", e))))
}

fn invoice_ref(chain: &str, contract: String, key: String) -> Result<InvoiceRef, ApiError> {
    let blockchain: Blockchain = chain.parse().map_err(|e| api_error(SettlementError::from(e)))?;
    Ok(InvoiceRef::new(blockchain, contract, key))
}

fn tx_response(state: &NodeState, blockchain: Blockchain, tx_id: String) -> Result<Json<TxResponse>, ApiError> {
    let adapter = state.engine.adapter(blockchain).map_err(api_error)?;
    Ok(Json(TxResponse {
        explorer_url: adapter.explorer_url(&tx_id),
        tx_id,
    }))
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn handle_status(State(state): State<Arc<NodeState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_chain: state.engine.current_blockchain(),
        supported_chains: state.engine.supported_blockchains(),
        operator: state.operator.clone(),
        cached_invoices: state.engine.cached_invoices(),
        pending_transactions: state.ledgers.pending_transactions(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn handle_create_invoice(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<Json<UnifiedInvoice>, ApiError> {
    let creator = signer(&req.seed)?;
    let params = CreateInvoiceParams {
        invoice_id: req.invoice_id,
        recipient: req.recipient,
        amount: req.amount,
        due_date: req.due_date,
        description: req.description,
        blockchain: req.blockchain,
        is_escrow: req.is_escrow,
        token_address: req.token_address,
        app_id: req.app_id,
    };
    let invoice = state
        .engine
        .create_invoice(&params, &creator)
        .await
        .map_err(api_error)?;
    Ok(Json(invoice))
}

async fn handle_pay_invoice(
    State(state): State<Arc<NodeState>>,
    Path((chain, contract, key)): Path<(String, String, String)>,
    Json(req): Json<SignerRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let reference = invoice_ref(&chain, contract, key)?;
    let payer = signer(&req.seed)?;
    let tx_id = state
        .engine
        .pay_invoice(&reference, &payer)
        .await
        .map_err(api_error)?;
    tx_response(&state, reference.blockchain, tx_id)
}

async fn handle_release_escrow(
    State(state): State<Arc<NodeState>>,
    Path((chain, contract, key)): Path<(String, String, String)>,
    Json(req): Json<SignerRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let reference = invoice_ref(&chain, contract, key)?;
    let releaser = signer(&req.seed)?;
    let tx_id = state
        .engine
        .release_escrow(&reference, &releaser)
        .await
        .map_err(api_error)?;
    tx_response(&state, reference.blockchain, tx_id)
}

async fn handle_refund_invoice(
    State(state): State<Arc<NodeState>>,
    Path((chain, contract, key)): Path<(String, String, String)>,
    Json(req): Json<SignerRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let reference = invoice_ref(&chain, contract, key)?;
    let refunder = signer(&req.seed)?;
    let tx_id = state
        .engine
        .refund_invoice(&reference, &refunder)
        .await
        .map_err(api_error)?;
    tx_response(&state, reference.blockchain, tx_id)
}

async fn handle_get_invoice(
    State(state): State<Arc<NodeState>>,
    Path((chain, contract, key)): Path<(String, String, String)>,
) -> Result<Json<UnifiedInvoice>, ApiError> {
    let reference = invoice_ref(&chain, contract, key)?;
    let invoice = state
        .engine
        .get_invoice_details(&reference)
        .await
        .map_err(api_error)?;
    Ok(Json(invoice))
}

async fn handle_is_overdue(
    State(state): State<Arc<NodeState>>,
    Path((chain, contract, key)): Path<(String, String, String)>,
) -> Result<Json<OverdueResponse>, ApiError> {
    let reference = invoice_ref(&chain, contract, key)?;
    let overdue = state.engine.is_overdue(&reference).await.map_err(api_error)?;
    Ok(Json(OverdueResponse {
        invoice: reference.to_string(),
        overdue,
    }))
}

async fn handle_switch_chain(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<SwitchChainRequest>,
) -> Result<Json<ChainResponse>, ApiError> {
    state.engine.switch_chain(req.blockchain).map_err(api_error)?;
    Ok(Json(ChainResponse {
        active: state.engine.current_blockchain(),
    }))
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/status", get(handle_status))
        .route("/api/v1/chain", post(handle_switch_chain))
        .route("/api/v1/invoices", post(handle_create_invoice))
        .route("/api/v1/invoices/{chain}/{contract}/{key}", get(handle_get_invoice))
        .route("/api/v1/invoices/{chain}/{contract}/{key}/overdue", get(handle_is_overdue))
        .route("/api/v1/invoices/{chain}/{contract}/{key}/pay", post(handle_pay_invoice))
        .route("/api/v1/invoices/{chain}/{contract}/{key}/release", post(handle_release_escrow))
        .route("/api/v1/invoices/{chain}/{contract}/{key}/refund", post(handle_refund_invoice))
        .with_state(state)
}

pub async fn start_api_server(
    listen_addr: SocketAddr,
    state: Arc<NodeState>,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
