//! `trustinvoice init`: Write a node configuration with a funded account.

use clap::Args;
use std::path::PathBuf;
use trustinvoice_settlement::LocalSigner;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory).
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Native balance credited to the new account on every chain.
    #[arg(long, default_value = "1000")]
    pub funds: String,
}

fn random_seed() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    let config_path = args.dir.join("trustinvoice.toml");

    if config_path.exists() {
        anyhow::bail!("configuration file already exists at {}", config_path.display());
    }

    std::fs::create_dir_all(&args.dir)?;

    let operator_seed = random_seed();
    let account_seed = random_seed();
    let account = LocalSigner::from_hex(&account_seed)?;
    let evm = account.evm_address();
    let algorand = account.algorand_address();
    let funds = &args.funds;

    let config = format!(
        r#"# TrustInvoice Node Configuration

[api]
listen_addr = "127.0.0.1"
port = 9101

[logging]
level = "info"
format = "text"

[engine]
fee_bps = 250
default_chain = "ethereum"

[engine.confirmation]
algorand_rounds = 4
evm_deployment_confirmations = 6
evm_call_confirmations = 1
evm_max_attempts = 30
poll_interval_ms = 1000
backoff_factor = 1.0
max_poll_interval_ms = 15000

[devnet]
operator_seed = "{operator_seed}"

[[devnet.faucet]]
blockchain = "ethereum"
address = "{evm}"
amount = "{funds}"

[[devnet.faucet]]
blockchain = "polygon"
address = "{evm}"
amount = "{funds}"

[[devnet.faucet]]
blockchain = "algorand"
address = "{algorand}"
amount = "{funds}"
"#
    );

    std::fs::write(&config_path, config)?;
    println!("Initialized TrustInvoice node at {}", config_path.display());
    println!();
    println!("Account (funded with {} on every chain):", funds);
    println!("  Seed:      {}", account_seed);
    println!("  EVM:       {}", evm);
    println!("  Algorand:  {}", algorand);
    println!();
    println!("Keep the seed; pass it with --seed to create, pay, release and refund.");
    println!("Run 'trustinvoice-node --config {}' to start the node.", config_path.display());

    Ok(())
}
