//! `trustinvoice switch`: Change the node's active chain.

use clap::Args;
use serde::{Deserialize, Serialize};
use trustinvoice_core::Blockchain;

use super::{client, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct SwitchArgs {
    /// Chain to activate (ethereum, polygon, algorand).
    pub chain: Blockchain,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
struct SwitchChainRequest {
    blockchain: Blockchain,
}

#[derive(Deserialize)]
struct ChainResponse {
    active: Blockchain,
}

pub async fn run(args: &SwitchArgs) -> anyhow::Result<()> {
    let body = SwitchChainRequest {
        blockchain: args.chain,
    };
    let resp: ChainResponse = client::post(&args.endpoint, "/api/v1/chain", &body).await?;
    println!("Active chain: {}", resp.active);
    Ok(())
}
