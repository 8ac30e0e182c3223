//! `trustinvoice status`: Query the status of a running node.

use clap::Args;
use serde::Deserialize;
use trustinvoice_core::Blockchain;

use super::{client, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    version: String,
    active_chain: Blockchain,
    supported_chains: Vec<Blockchain>,
    operator: String,
    cached_invoices: usize,
    pending_transactions: usize,
    uptime_secs: u64,
}

pub async fn run(args: &StatusArgs) -> anyhow::Result<()> {
    println!("Querying node status at {}...", args.endpoint);
    println!();

    let status: StatusResponse = client::get(&args.endpoint, "/api/v1/status").await?;
    let supported: Vec<String> = status
        .supported_chains
        .iter()
        .map(|b| b.to_string())
        .collect();

    println!("Node Status:");
    println!("  Version:     {}", status.version);
    println!("  Active:      {}", status.active_chain);
    println!("  Supported:   {}", supported.join(", "));
    println!("  Operator:    {}", status.operator);
    println!("  Invoices:    {} cached", status.cached_invoices);
    println!("  Pending:     {} transactions", status.pending_transactions);
    println!("  Uptime:      {}s", status.uptime_secs);

    Ok(())
}
