//! `trustinvoice refund`: Return the full amount to the payer.

use clap::Args;

use super::{client, InvoiceArgs};

#[derive(Args, Debug)]
pub struct RefundArgs {
    #[command(flatten)]
    pub invoice: InvoiceArgs,

    /// Hex seed of the refunder's account.
    #[arg(short, long)]
    pub seed: String,
}

pub async fn run(args: &RefundArgs) -> anyhow::Result<()> {
    println!("Refunding {}:{}...", args.invoice.chain, args.invoice.key);
    let tx = client::transact(&args.invoice, "refund", &args.seed).await?;

    println!("Refund confirmed!");
    println!("  Tx:        {}", tx.tx_id);
    println!("  Explorer:  {}", tx.explorer_url);

    Ok(())
}
