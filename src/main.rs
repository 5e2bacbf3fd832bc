use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::SecondsFormat;
use clap::{Parser, Subcommand};

use console_auth::AuthConfig;
use console_auth::identity::{self, AuthIdentity, authenticator};
use console_auth::logging;
use console_auth::session::authorize_url;
use console_auth::wallet::{AddEthereumChainParameter, ChainId};

#[derive(Parser, Debug)]
#[command(name = "console-auth")]
#[command(version, about = "Inspect console wallet identities and login URLs", long_about = None)]
struct Cli {
    /// TOML config file (defaults to ~/.console-auth/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Work with stored identity files
    #[command(subcommand)]
    Identity(IdentityCommand),

    /// Print the login URL that redirects back to CURRENT_URL
    AuthorizeUrl { current_url: String },

    /// List supported networks and their add-network parameters
    Networks,
}

#[derive(Subcommand, Debug)]
enum IdentityCommand {
    /// Show owner, expiration and validity of an identity file
    Inspect { file: PathBuf },

    /// Sign PAYLOAD with the identity's ephemeral key
    Sign { file: PathBuf, payload: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AuthConfig::from_env_with_toml(cli.config.as_deref())
        .context("failed to load configuration")?;
    logging::init_tracing(config.log_format);
    tracing::debug!(auth_path = %config.auth_path, "Configuration loaded");

    match cli.command {
        Command::Identity(IdentityCommand::Inspect { file }) => inspect_identity(&file),
        Command::Identity(IdentityCommand::Sign { file, payload }) => {
            let identity = read_identity(&file)?;
            let chain = authenticator::sign_payload(&identity, &payload)?;
            println!("{}", serde_json::to_string_pretty(&chain)?);
            Ok(())
        }
        Command::AuthorizeUrl { current_url } => {
            println!("{}", authorize_url(&config.auth_path, &current_url));
            Ok(())
        }
        Command::Networks => print_networks(config.default_chain_id),
    }
}

fn read_identity(path: &Path) -> anyhow::Result<AuthIdentity> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not an identity", path.display()))
}

fn inspect_identity(path: &Path) -> anyhow::Result<()> {
    let identity = read_identity(path)?;

    println!(
        "Owner:       {}",
        identity.owner_address().as_deref().unwrap_or("(none)")
    );
    println!("Ephemeral:   {}", identity.ephemeral_identity.address);
    println!(
        "Expiration:  {}",
        identity
            .expiration
            .to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    println!("Expired:     {}", identity.is_expired());
    println!("Usable:      {}", identity::is_valid(Some(&identity)));
    match authenticator::verify_auth_chain(&identity.auth_chain) {
        Ok(owner) => println!("Signatures:  verified for {owner}"),
        Err(e) => println!("Signatures:  {e}"),
    }
    Ok(())
}

fn print_networks(default_chain_id: ChainId) -> anyhow::Result<()> {
    for chain_id in ChainId::KNOWN {
        let marker = if chain_id == default_chain_id { "*" } else { " " };
        println!(
            "{marker} {:>9}  {}",
            chain_id.value(),
            chain_id.name().unwrap_or("unknown")
        );
        if let Some(params) = AddEthereumChainParameter::for_chain(chain_id) {
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
    }
    Ok(())
}
