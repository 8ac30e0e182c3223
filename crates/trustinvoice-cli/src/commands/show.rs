//! `trustinvoice show`: Show an invoice as recorded on its chain.

use clap::Args;
use trustinvoice_core::units::format_units;
use trustinvoice_core::UnifiedInvoice;

use super::{client, InvoiceArgs};

#[derive(Args, Debug)]
pub struct ShowArgs {
    #[command(flatten)]
    pub invoice: InvoiceArgs,

    /// Print the raw JSON returned by the node.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: &ShowArgs) -> anyhow::Result<()> {
    let invoice: UnifiedInvoice = client::get(&args.invoice.endpoint, &args.invoice.path()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&invoice)?);
        return Ok(());
    }

    println!("Invoice {}", invoice.id);
    println!("  Chain:       {}", invoice.blockchain);
    println!("  Status:      {}", invoice.status);
    match invoice.token_address {
        // Token decimals are unknown here, so show base units.
        Some(ref token) => println!("  Amount:      {} (token {})", invoice.amount, token),
        None => println!(
            "  Amount:      {} {}",
            format_units(invoice.amount, invoice.blockchain.native_decimals()),
            invoice.blockchain.native_symbol()
        ),
    }
    println!("  Recipient:   {}", invoice.recipient);
    println!("  Creator:     {}", invoice.creator);
    if let Some(ref payer) = invoice.payer {
        println!("  Payer:       {}", payer);
    }
    println!("  Due:         {}", invoice.due_date);
    println!("  Escrow:      {}", invoice.is_escrow);
    if let Some(bps) = invoice.fee_bps {
        println!("  Fee:         {} bps", bps);
    }
    for tx in &invoice.tx_ids {
        println!("  Tx:          {}", tx);
    }
    println!("  Explorer:    {}", invoice.explorer_url);

    Ok(())
}
