//! Minimal JSON client for the node's HTTP API.

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

pub async fn get<R: DeserializeOwned>(endpoint: &str, path: &str) -> anyhow::Result<R> {
    let url = format!("{}{}", endpoint, path);
    let resp = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .with_context(|| unreachable_message(endpoint))?;
    decode(resp).await
}

pub async fn post<B: Serialize, R: DeserializeOwned>(
    endpoint: &str,
    path: &str,
    body: &B,
) -> anyhow::Result<R> {
    let url = format!("{}{}", endpoint, path);
    let resp = reqwest::Client::new()
        .post(&url)
        .json(body)
        .send()
        .await
        .with_context(|| unreachable_message(endpoint))?;
    decode(resp).await
}

async fn decode<R: DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<R> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    match resp.json::<ErrorResponse>().await {
        Ok(err) => anyhow::bail!("request failed (HTTP {}): {}", status, err.error),
        Err(_) => anyhow::bail!("request failed (HTTP {})", status),
    }
}

fn unreachable_message(endpoint: &str) -> String {
    format!(
        "could not reach node at {}; start one with: trustinvoice-node",
        endpoint
    )
}

#[derive(Serialize)]
struct SignerRequest<'a> {
    seed: &'a str,
}

#[derive(Deserialize)]
pub struct TxResponse {
    pub tx_id: String,
    pub explorer_url: String,
}

/// POST a signed lifecycle action (`pay`, `release`, `refund`) for an invoice.
pub async fn transact(
    invoice: &super::InvoiceArgs,
    action: &str,
    seed: &str,
) -> anyhow::Result<TxResponse> {
    let path = format!("{}/{}", invoice.path(), action);
    post(&invoice.endpoint, &path, &SignerRequest { seed }).await
}
