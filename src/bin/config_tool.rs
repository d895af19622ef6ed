use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::fs;
use std::path::PathBuf;

use solana_swap_bot::config::crypto::{self, KeySource};
use solana_swap_bot::config::{self, Config};

/// Encrypt, decrypt and inspect bot configuration files.
///
/// Key material comes from CONFIG_PASSWORD (PBKDF2) or
/// CONFIG_ENCRYPTION_KEY (64 hex chars).
#[derive(Parser)]
#[command(name = "config_tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seal a plaintext JSON config
    Encrypt {
        input: PathBuf,
        #[arg(short, long, default_value = "config.enc")]
        output: PathBuf,
    },
    /// Open an encrypted config. Prints to stdout unless --output is given
    Decrypt {
        #[arg(default_value = "config.enc")]
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective config with secrets masked
    Show {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn"));

    match Cli::parse().command {
        Command::Encrypt { input, output } => {
            let plaintext = fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            // Refuse to seal something the bot could not load
            let parsed: Config = serde_json::from_slice(&plaintext)
                .with_context(|| format!("{} is not a valid config", input.display()))?;
            parsed.validate()?;

            let source = KeySource::from_env()?;
            let envelope = crypto::encrypt(&plaintext, &source)?;
            fs::write(&output, serde_json::to_string_pretty(&envelope)?)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Encrypted {} -> {} ({})", input.display(), output.display(), envelope.kdf);
        }
        Command::Decrypt { input, output } => {
            let bytes = fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
            let Some(envelope) = config::as_envelope(&bytes) else {
                bail!("{} is not an encrypted config", input.display());
            };
            let source = KeySource::from_env_for(&envelope)?;
            let plaintext = crypto::decrypt(&envelope, &source)?;

            match output {
                Some(path) => {
                    fs::write(&path, &plaintext).with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Decrypted {} -> {}", input.display(), path.display());
                }
                None => println!("{}", String::from_utf8_lossy(&plaintext)),
            }
        }
        Command::Show { config } => {
            let loaded = config::load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&loaded.redacted())?);
        }
    }

    Ok(())
}
