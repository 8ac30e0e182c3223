//! TrustInvoice CLI: command-line client for a TrustInvoice node.
//!
//! Subcommands: init, create, pay, release, refund, show, overdue, switch, status.

mod commands;

use clap::{Parser, Subcommand};

/// TrustInvoice: invoices settled on Ethereum, Polygon and Algorand.
#[derive(Parser, Debug)]
#[command(name = "trustinvoice", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a node configuration with a freshly funded account.
    Init(commands::init::InitArgs),
    /// Create an invoice on the active chain.
    Create(commands::create::CreateArgs),
    /// Pay an invoice in full.
    Pay(commands::pay::PayArgs),
    /// Release escrowed funds to the recipient.
    Release(commands::release::ReleaseArgs),
    /// Refund the payer of an invoice.
    Refund(commands::refund::RefundArgs),
    /// Show an invoice as recorded on its chain.
    Show(commands::show::ShowArgs),
    /// Check whether an invoice is past due and unpaid.
    Overdue(commands::overdue::OverdueArgs),
    /// Change the node's active chain.
    Switch(commands::switch::SwitchArgs),
    /// Query the status of a running node.
    Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Create(args) => commands::create::run(args).await,
        Commands::Pay(args) => commands::pay::run(args).await,
        Commands::Release(args) => commands::release::run(args).await,
        Commands::Refund(args) => commands::refund::run(args).await,
        Commands::Show(args) => commands::show::run(args).await,
        Commands::Overdue(args) => commands::overdue::run(args).await,
        Commands::Switch(args) => commands::switch::run(args).await,
        Commands::Status(args) => commands::status::run(args).await,
    }
}
