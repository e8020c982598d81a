//! fab-agent
//!
//! Ask a Cisco APIC fabric questions in plain language:
//! - `ask`: one request, one answer
//! - `chat`: interactive conversation with history
//! - `login`: verify and save controller credentials

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fab_controller::ControllerSession;
use fab_core::config::mask_secret;
use fab_core::{AgentConfig, ControllerSettings, CredentialStore, StoredCredentials};
use std::path::PathBuf;
use tracing::{info, warn};

mod chat;
mod wiring;

#[derive(Parser, Debug)]
#[command(name = "fab-agent")]
#[command(about = "Retrieval-augmented agent for Cisco APIC fabrics")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); defaults to $FABRIC_AGENT_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Credential store location
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Print whole turns (tool calls included) as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a single request
    Ask {
        /// The request, e.g. "list tenants"
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Interactive conversation
    Chat,
    /// Check controller credentials and store them for later runs
    Login {
        /// Controller address, e.g. https://192.168.1.250
        #[arg(long)]
        url: String,
        #[arg(long)]
        username: String,
        /// Read from APIC_PASSWORD or stdin when omitted
        #[arg(long)]
        password: Option<String>,
        /// Save without contacting the controller
        #[arg(long)]
        no_verify: bool,
        /// Accept self-signed certificates while verifying
        #[arg(long)]
        insecure: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first, without overriding the real environment
    fab_core::config::load_environment();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fab_agent=info".parse()?)
                .add_directive("fab_chat=info".parse()?)
                .add_directive("fab_tools=info".parse()?)
                .add_directive("fab_controller=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let store = match &args.credentials {
        Some(path) => CredentialStore::at(path),
        None => CredentialStore::default_location()?,
    };

    match args.command {
        Commands::Login {
            url,
            username,
            password,
            no_verify,
            insecure,
        } => login(&store, url, username, password, no_verify, insecure).await,
        Commands::Ask { query } => {
            let agent = start(&args.config, &store).await?;
            let turn = agent
                .service
                .handle(&uuid::Uuid::new_v4().to_string(), &query.join(" "))
                .await?;
            chat::print_turn(&turn, args.json)?;
            agent.controller.logout().await;
            Ok(())
        }
        Commands::Chat => {
            let agent = start(&args.config, &store).await?;
            chat::run(&agent.service, args.json).await?;
            let stats = agent.registry.stats().await;
            info!(
                "Session closed: {} tool calls, {} failed",
                stats.total_calls, stats.total_failures
            );
            agent.controller.logout().await;
            Ok(())
        }
    }
}

/// Layered config plus stored credentials, then the wired agent
async fn start(config_path: &Option<PathBuf>, store: &CredentialStore) -> Result<wiring::Agent> {
    let mut config = AgentConfig::load(config_path.as_deref())?;
    match store.load() {
        Ok(Some(stored)) => config.apply_stored_credentials(&stored),
        Ok(None) => {}
        Err(e) => warn!("Ignoring unreadable credential store {}: {}", store.path().display(), e),
    }
    wiring::build(&config).await
}

async fn login(
    store: &CredentialStore,
    url: String,
    username: String,
    password: Option<String>,
    no_verify: bool,
    insecure: bool,
) -> Result<()> {
    let password = match password.or_else(|| fab_core::config::get_config_opt("APIC_PASSWORD")) {
        Some(p) => p,
        None => read_password()?,
    };
    let creds = StoredCredentials::new(url, username, password)?;

    if !no_verify {
        let settings = ControllerSettings {
            base_url: creds.base_url.clone(),
            username: creds.username.clone(),
            password: creds.password.clone(),
            accept_invalid_certs: insecure,
            ..ControllerSettings::default()
        };
        let session = ControllerSession::new(&settings)?;
        session
            .authenticate()
            .await
            .with_context(|| format!("Login to {} as {} failed", creds.base_url, creds.username))?;
        session.logout().await;
        info!(
            "Verified {}@{} (password {})",
            creds.username,
            creds.base_url,
            mask_secret(&creds.password)
        );
    }

    store.save(&creds)?;
    println!("Saved credentials to {}", store.path().display());
    Ok(())
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("No password given");
    }
    Ok(password)
}
