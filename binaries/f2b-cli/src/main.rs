//! f2b-dashboard
//!
//! ```bash
//! f2b-dashboard                          # serve on 0.0.0.0:8502
//! f2b-dashboard serve --port 9000 --demo true
//! f2b-dashboard status                   # snapshot as JSON
//! f2b-dashboard log --limit 50 --jail sshd
//! f2b-dashboard mode
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use f2b_actionlog::{ActionLog, LogQuery};
use f2b_config::{Config, DemoSetting};
use f2b_core::validate_jail_name;
use f2b_exec::{ClientExecutor, Fail2banClient};
use f2b_web::{resolve_mode, AppState};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str =
    "f2b_dashboard=info,f2b_web=info,f2b_exec=info,f2b_actionlog=info,tower_http=info";

#[derive(Parser)]
#[command(name = "f2b-dashboard")]
#[command(about = "Monitor and control fail2ban over a JSON API")]
#[command(version)]
struct Cli {
    /// YAML config file (defaults to $F2B_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(short, long)]
        bind: Option<String>,

        /// auto, true or false
        #[arg(long)]
        demo: Option<DemoSetting>,

        /// Directory served at `/`
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Print the current status snapshot as JSON
    Status,

    /// Print recent ban/unban actions
    Log {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(short, long)]
        jail: Option<String>,

        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Print the mode the server would start in
    Mode,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        bind: None,
        demo: None,
        static_dir: None,
    }) {
        Commands::Serve {
            port,
            bind,
            demo,
            static_dir,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(demo) = demo {
                config.demo = demo;
            }
            if static_dir.is_some() {
                config.static_dir = static_dir;
            }
            serve(config).await
        }
        Commands::Status => status(config).await,
        Commands::Log { limit, jail, json } => log(config, limit, jail, json).await,
        Commands::Mode => mode(config).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    // stderr keeps stdout clean for `status` and `log`
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn serve(config: Config) -> Result<()> {
    let addr = config.listen_addr();
    tracing::info!(
        demo = %config.demo,
        client = %config.client,
        remote = config.is_remote(),
        log = %config.log_path.display(),
        "starting"
    );

    let state = AppState::from_config(config)
        .await
        .context("opening action log")?;
    f2b_web::serve(state)
        .await
        .with_context(|| format!("serving on {addr}"))
}

async fn status(config: Config) -> Result<()> {
    let state = AppState::from_config(config)
        .await
        .context("opening action log")?;
    let snapshot = state.status().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn log(config: Config, limit: usize, jail: Option<String>, json: bool) -> Result<()> {
    if let Some(name) = &jail {
        validate_jail_name(name)?;
    }

    let store = ActionLog::open(&config.log_path)
        .await
        .with_context(|| format!("opening {}", config.log_path.display()))?;
    let entries = store
        .query(&LogQuery {
            limit: Some(limit),
            jail,
            ..LogQuery::default()
        })
        .await?;

    if json {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("No actions logged in {}", config.log_path.display());
        return Ok(());
    }
    for e in &entries {
        println!(
            "{:>5}  {}  {:<5}  {:<7}  {:<16}  {}{}",
            e.id,
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.action.as_str(),
            if e.succeeded() { "ok" } else { "FAILED" },
            e.jail,
            e.ip,
            e.error.as_deref().map(|m| format!("  ({m})")).unwrap_or_default(),
        );
    }
    Ok(())
}

async fn mode(config: Config) -> Result<()> {
    let client = Fail2banClient::new(Arc::new(ClientExecutor::new(&config)));
    let mode = resolve_mode(config.demo, &client).await;
    println!("{mode} (demo setting: {}, client: {})", config.demo, client.describe());
    Ok(())
}
