//! `trustinvoice release`: Release escrowed funds to the recipient.

use clap::Args;

use super::{client, InvoiceArgs};

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    #[command(flatten)]
    pub invoice: InvoiceArgs,

    /// Hex seed of the recipient's account.
    #[arg(short, long)]
    pub seed: String,
}

pub async fn run(args: &ReleaseArgs) -> anyhow::Result<()> {
    println!("Releasing escrow for {}:{}...", args.invoice.chain, args.invoice.key);
    let tx = client::transact(&args.invoice, "release", &args.seed).await?;

    println!("Escrow released!");
    println!("  Tx:        {}", tx.tx_id);
    println!("  Explorer:  {}", tx.explorer_url);

    Ok(())
}
