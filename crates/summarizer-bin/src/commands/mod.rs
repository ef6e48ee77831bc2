//! CLI command implementations.

mod article;
mod auth;
mod status;

pub use article::{ask, health, summarize};
pub use auth::{callback, login, logout};
pub use status::status;

use crate::navigator::CliNavigator;
use anyhow::{Context, Result};
use auth_state_controller::AuthContext;
use client_storage::ClientStorage;
use std::path::PathBuf;
use std::sync::Arc;
use summarizer_api_client::{ApiClient, ArticleAssistant};
use summarizer_config_and_utils::{Config, Paths};
use tracing::debug;

/// Everything a command needs, built once per invocation.
pub struct App {
    pub paths: Paths,
    pub config: Config,
    pub context: AuthContext,
    pub navigator: Arc<CliNavigator>,
}

impl App {
    /// Resolve paths and load configuration. Nothing is started yet.
    pub fn load(base_dir: Option<PathBuf>) -> Result<(Paths, Config)> {
        let paths = match base_dir {
            Some(dir) => Paths::with_base_dir(dir),
            None => Paths::new()?,
        };
        paths.ensure_dirs()?;
        let config = Config::load(&paths)
            .with_context(|| format!("Failed to load {}", paths.config_file().display()))?;
        Ok((paths, config))
    }

    pub fn new(paths: Paths, config: Config) -> Result<Self> {
        let context = build_context(&paths, &config)?;
        Ok(Self {
            paths,
            config,
            context,
            navigator: Arc::new(CliNavigator::new()),
        })
    }

    /// Start the auth core and wait until it has an answer.
    pub async fn start(&self) {
        self.context.start();
        let outcome = self.context.controller().wait_for_auth_ready().await;
        if outcome.was_forced() {
            debug!("Auth readiness forced by timeout");
        }
    }

    /// Tear down the auth core and build a fresh one over the same storage,
    /// the terminal's equivalent of a page reload.
    pub async fn reload(&mut self) -> Result<()> {
        self.context.shutdown();
        self.context = build_context(&self.paths, &self.config)?;
        self.start().await;
        Ok(())
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        let base_url = self.config.api_base_url()?;
        Ok(ApiClient::new(self.context.clone(), base_url)?)
    }

    pub fn assistant(&self) -> Result<ArticleAssistant> {
        Ok(ArticleAssistant::new(self.context.clone(), self.api_client()?))
    }

    pub fn shutdown(&self) {
        self.context.shutdown();
    }
}

fn build_context(paths: &Paths, config: &Config) -> Result<AuthContext> {
    let storage = ClientStorage::with_files(paths.local_storage_file(), paths.session_storage_file());
    let context = AuthContext::supabase(
        config.supabase_url()?,
        &config.supabase_anon_key,
        storage,
        config.auth.clone(),
    )?;
    Ok(context)
}
