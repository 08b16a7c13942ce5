use std::path::Path;

use anyhow::{bail, Context, Result};

use moneymate_lib::config::ClientConfig;
use moneymate_lib::session::Credential;
use moneymate_lib::ClientContext;

use crate::OutputFormat;

/// Shared application state for CLI commands
pub struct App {
    pub ctx: ClientContext,
    pub format: OutputFormat,
    pub use_color: bool,
}

impl App {
    /// Load the config and open the stored session
    pub fn new(config_path: Option<&Path>, format: OutputFormat, use_color: bool) -> Result<Self> {
        let config = ClientConfig::load(config_path).context("Failed to load config")?;
        log::debug!("cli: using document store at {}", config.api_base_url);

        let ctx = ClientContext::open(config).context("Failed to open client")?;

        Ok(Self {
            ctx,
            format,
            use_color,
        })
    }

    /// The stored credential, or an error telling the user to log in
    pub fn require_login(&self) -> Result<Credential> {
        match self.ctx.session.current_credential() {
            Some(credential) => Ok(credential),
            None => bail!("Not logged in. Run `moneymate-cli login <email>` first."),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }
}
