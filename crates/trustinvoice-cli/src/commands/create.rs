//! `trustinvoice create`: Create an invoice on the node's active chain.

use clap::Args;
use serde::Serialize;
use trustinvoice_core::types::now_secs;
use trustinvoice_core::units::{format_units, parse_units};
use trustinvoice_core::{Blockchain, UnifiedInvoice};

use super::{client, DEFAULT_ENDPOINT};

const SECS_PER_DAY: u64 = 86_400;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Recipient address on the target chain.
    #[arg(short = 'r', long)]
    pub recipient: String,

    /// Amount in whole units (e.g. 100, 0.5).
    #[arg(short, long)]
    pub amount: String,

    /// Chain to create the invoice on. Must be the node's active chain.
    #[arg(short, long, default_value = "ethereum")]
    pub chain: Blockchain,

    /// Invoice id (defaults to a generated INV-<uuid>).
    #[arg(long)]
    pub id: Option<String>,

    /// Due date as a unix timestamp. Overrides --due-in-days.
    #[arg(long)]
    pub due: Option<u64>,

    /// Days from now until the invoice is due.
    #[arg(long, default_value_t = 30)]
    pub due_in_days: u64,

    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Hold the payment in escrow until the recipient releases it (EVM only).
    #[arg(long)]
    pub escrow: bool,

    /// ERC-20 token contract to settle in instead of the native currency (EVM only).
    #[arg(long)]
    pub token: Option<String>,

    /// Decimals of --amount (defaults to the chain's native decimals).
    #[arg(long)]
    pub decimals: Option<u8>,

    /// Existing Algorand application to add the invoice to.
    #[arg(long)]
    pub app_id: Option<u64>,

    /// Hex seed of the creator's account.
    #[arg(short, long)]
    pub seed: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
struct CreateInvoiceRequest<'a> {
    invoice_id: String,
    recipient: &'a str,
    amount: u128,
    due_date: u64,
    description: &'a str,
    blockchain: Blockchain,
    is_escrow: bool,
    token_address: Option<&'a str>,
    app_id: Option<u64>,
    seed: &'a str,
}

pub async fn run(args: &CreateArgs) -> anyhow::Result<()> {
    let decimals = args.decimals.unwrap_or(args.chain.native_decimals());
    let amount = parse_units(&args.amount, decimals)?;
    let due_date = args
        .due
        .unwrap_or_else(|| now_secs() + args.due_in_days * SECS_PER_DAY);
    let body = CreateInvoiceRequest {
        invoice_id: args
            .id
            .clone()
            .unwrap_or_else(|| format!("INV-{}", uuid::Uuid::now_v7())),
        recipient: &args.recipient,
        amount,
        due_date,
        description: &args.description,
        blockchain: args.chain,
        is_escrow: args.escrow,
        token_address: args.token.as_deref(),
        app_id: args.app_id,
        seed: &args.seed,
    };

    println!("Creating invoice {}...", body.invoice_id);
    let invoice: UnifiedInvoice = client::post(&args.endpoint, "/api/v1/invoices", &body).await?;

    println!("Invoice created!");
    println!("  Id:        {}", invoice.id);
    println!("  Amount:    {} ({} minor units)", format_units(invoice.amount, decimals), invoice.amount);
    println!("  Status:    {}", invoice.status);
    println!("  Explorer:  {}", invoice.explorer_url);
    println!();
    println!(
        "Reference: {} {} {}",
        invoice.blockchain, invoice.chain_identifier, invoice.invoice_key
    );

    Ok(())
}
