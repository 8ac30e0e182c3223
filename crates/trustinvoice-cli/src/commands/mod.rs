pub mod client;
pub mod create;
pub mod init;
pub mod overdue;
pub mod pay;
pub mod refund;
pub mod release;
pub mod show;
pub mod status;
pub mod switch;

use clap::Args;
use trustinvoice_core::Blockchain;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9101";

/// Where an invoice lives: chain, contract (registry address or application
/// id) and key (invoice hash or invoice id).
#[derive(Args, Debug)]
pub struct InvoiceArgs {
    /// Chain the invoice lives on (ethereum, polygon, algorand).
    pub chain: Blockchain,

    /// Registry address (EVM) or application id (Algorand).
    pub contract: String,

    /// Invoice hash (EVM) or invoice id (Algorand).
    pub key: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

impl InvoiceArgs {
    pub fn path(&self) -> String {
        format!(
            "/api/v1/invoices/{}/{}/{}",
            self.chain, self.contract, self.key
        )
    }
}
