mod commands;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use subspace_api::SecretStore;
use subspace_auth::{SessionManager, SharedSecret, TokenCodec};
use subspace_connectors::EnvSecretStore;
use subspace_core::{
    CONFIG_FILE_NAME, GatewayConfig, LogFormat, SessionSettings, default_config_dir,
    load_config_from_dir, write_default_config_file,
};
use subspace_gateway::cookie_options;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::{serve, token};

#[derive(Debug, Parser)]
#[command(name = "subspace", about = "Subspace web gateway")]
struct Cli {
    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a default gateway.toml and print a fresh session secret
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration and the session secret
    Check,
    /// Issue or inspect session tokens
    Token {
        #[command(subcommand)]
        command: token::TokenCommands,
    },
    /// Run the web server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg_dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);

    match cli.command {
        Commands::Init { force } => {
            let path = cfg_dir.join(CONFIG_FILE_NAME);
            if force && path.exists() {
                fs::remove_file(&path)?;
            }
            let path = write_default_config_file(&cfg_dir)?;
            let secret_env = load_config_from_dir(&cfg_dir)
                .map(|c| c.session.secret_env)
                .unwrap_or_else(|_| SessionSettings::default().secret_env);
            let secret = SharedSecret::generate().to_hex();
            pout(
                cli.json,
                serde_json::json!({"message": "init complete", "config": path, "secret": secret}),
                &format!(
                    "Init complete: {}\nexport {secret_env}={secret}",
                    path.display()
                ),
            )?;
        }
        Commands::Check => {
            let config = load_config_from_dir(&cfg_dir)?;
            load_secret(&config)?;
            pout(
                cli.json,
                serde_json::json!({
                    "ok": true,
                    "http_host": config.http_host,
                    "listen": config.listen,
                    "federation": config.federation.enabled,
                }),
                "Configuration OK",
            )?;
        }
        Commands::Token { command } => {
            let config = load_config_from_dir(&cfg_dir)?;
            let sessions = session_manager(&config, load_secret(&config)?);
            token::cmd_token(command, &sessions, cli.json)?;
        }
        Commands::Serve => {
            let config = load_config_from_dir(&cfg_dir)?;
            init_tracing(config.log_format);
            let secret = load_secret(&config)?;
            serve::run(&config, secret).await?;
        }
    }

    Ok(())
}

pub(crate) fn load_secret(config: &GatewayConfig) -> anyhow::Result<SharedSecret> {
    let hex = EnvSecretStore
        .get(&config.session.secret_env)
        .context("session secret not available (run `subspace init`)")?;
    let secret = SharedSecret::from_hex(&hex)
        .with_context(|| format!("{} is not a usable secret", config.session.secret_env))?;
    Ok(secret)
}

pub(crate) fn session_manager(config: &GatewayConfig, secret: SharedSecret) -> SessionManager {
    SessionManager::new(TokenCodec::new(secret), cookie_options(config))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

pub fn pout(json_mode: bool, value: serde_json::Value, text: &str) -> anyhow::Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{text}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_issue() {
        let cli = Cli::try_parse_from([
            "subspace",
            "--json",
            "token",
            "issue",
            "--admin",
            "--user-id",
            "u-1",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Token {
                command: token::TokenCommands::Issue { admin, user_id },
            } => {
                assert!(admin);
                assert_eq!(user_id.as_deref(), Some("u-1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_global_config_dir() {
        let cli = Cli::try_parse_from(["subspace", "check", "--config-dir", "/tmp/sub"]).unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/sub")));
        assert!(matches!(cli.command, Commands::Check));
    }
}
