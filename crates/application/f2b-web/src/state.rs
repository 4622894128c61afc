//! Shared application state, built once at startup

use std::sync::Arc;

use f2b_actionlog::{ActionLog, StoreError};
use f2b_config::{Config, DemoSetting};
use f2b_core::Mode;
use f2b_exec::{ClientExecutor, Fail2banClient};

pub struct AppState {
    pub config: Config,
    /// Fixed for the life of the process.
    pub mode: Mode,
    pub client: Fail2banClient,
    pub log: ActionLog,
    /// Pins demo data to one seed instead of the current hour.
    pub demo_seed: Option<u64>,
}

impl AppState {
    pub fn new(config: Config, mode: Mode, client: Fail2banClient, log: ActionLog) -> Self {
        Self {
            config,
            mode,
            client,
            log,
            demo_seed: None,
        }
    }

    pub fn with_demo_seed(mut self, seed: u64) -> Self {
        self.demo_seed = Some(seed);
        self
    }

    /// Real executor from `config`, mode resolved, action log opened.
    pub async fn from_config(config: Config) -> Result<Arc<Self>, StoreError> {
        let client = Fail2banClient::new(Arc::new(ClientExecutor::new(&config)));
        let mode = resolve_mode(config.demo, &client).await;
        let log = ActionLog::open(&config.log_path).await?;
        Ok(Arc::new(Self::new(config, mode, client, log)))
    }

    pub fn is_demo(&self) -> bool {
        self.mode.is_demo()
    }
}

/// `true`/`false` force the mode; `auto` pings the daemon and falls back to
/// demo when it does not answer.
pub async fn resolve_mode(setting: DemoSetting, client: &Fail2banClient) -> Mode {
    if let Some(mode) = setting.forced_mode() {
        tracing::info!(%mode, "mode forced by configuration");
        return mode;
    }

    match client.ping().await {
        Ok(_) => {
            tracing::info!(client = %client.describe(), "fail2ban answered, running live");
            Mode::Live
        }
        Err(e) => {
            tracing::info!(client = %client.describe(), error = %e, "fail2ban not available, running in demo mode");
            Mode::Demo
        }
    }
}
