//! `trustinvoice pay`: Pay an invoice in full.

use clap::Args;

use super::{client, InvoiceArgs};

#[derive(Args, Debug)]
pub struct PayArgs {
    #[command(flatten)]
    pub invoice: InvoiceArgs,

    /// Hex seed of the payer's account.
    #[arg(short, long)]
    pub seed: String,
}

pub async fn run(args: &PayArgs) -> anyhow::Result<()> {
    println!("Paying {}:{}...", args.invoice.chain, args.invoice.key);
    let tx = client::transact(&args.invoice, "pay", &args.seed).await?;

    println!("Payment confirmed!");
    println!("  Tx:        {}", tx.tx_id);
    println!("  Explorer:  {}", tx.explorer_url);

    Ok(())
}
