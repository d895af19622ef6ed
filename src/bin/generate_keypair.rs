use anyhow::{bail, Context, Result};
use clap::Parser;
use solana_sdk::signer::keypair::Keypair;
use solana_sdk::signer::Signer;
use std::fs;
use std::path::PathBuf;

/// Generate a wallet keypair for the bot
#[derive(Parser)]
#[command(name = "generate_keypair", version)]
struct Cli {
    /// Keypair file, written as a JSON byte array
    #[arg(short, long, default_value = "wallet-keypair.json")]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.output.exists() && !cli.force {
        bail!("{} already exists, pass --force to overwrite", cli.output.display());
    }

    let keypair = Keypair::new();
    let bytes = keypair.to_bytes();

    fs::write(&cli.output, serde_json::to_string(&bytes.to_vec())?)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    println!("Keypair file: {}", cli.output.display());
    println!("Pubkey:       {}", keypair.pubkey());
    println!("Base58:       {}", bs58::encode(&bytes).into_string());
    println!("Hex:          {}", hex::encode(bytes));
    println!();
    println!("Add one of the secrets under \"wallets\" in the config, then encrypt it with config_tool.");

    Ok(())
}
