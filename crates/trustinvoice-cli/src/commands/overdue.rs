//! `trustinvoice overdue`: Check whether an invoice is past due and unpaid.

use clap::Args;
use serde::Deserialize;

use super::{client, InvoiceArgs};

#[derive(Args, Debug)]
pub struct OverdueArgs {
    #[command(flatten)]
    pub invoice: InvoiceArgs,
}

#[derive(Deserialize)]
struct OverdueResponse {
    invoice: String,
    overdue: bool,
}

pub async fn run(args: &OverdueArgs) -> anyhow::Result<()> {
    let path = format!("{}/overdue", args.invoice.path());
    let resp: OverdueResponse = client::get(&args.invoice.endpoint, &path).await?;
    if resp.overdue {
        println!("{} is OVERDUE", resp.invoice);
    } else {
        println!("{} is not overdue", resp.invoice);
    }
    Ok(())
}
