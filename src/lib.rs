pub mod analyzer;
pub mod config;
pub mod diff;
pub mod github;
pub mod pipeline;
pub mod repo;
pub mod retry;
pub mod review;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use analyzer::Analyzer;
use config::BotConfig;
use github::token::TokenCache;
use github::{Forge, GithubClient};
use repo::RepoManager;

/// Shared application state passed to every webhook handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<BotConfig>,
    /// Installation access token cache (the only long-lived in-process
    /// state; everything else is re-derived per delivery).
    pub tokens: Arc<TokenCache>,
    pub repos: Arc<RepoManager>,
    pub analyzer: Arc<Analyzer>,
    pub forge: Arc<dyn Forge>,
}

impl AppContext {
    /// Wire the production collaborators from config.
    pub fn new(config: BotConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("typecheckd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let tokens = Arc::new(TokenCache::new(
            http.clone(),
            config.api_base.clone(),
            config.app_id.clone(),
            &config.private_key,
        )?);
        let repos = Arc::new(RepoManager::new(&config.repos_dir));
        let analyzer = Arc::new(Analyzer::new(
            &config.checker_bin,
            Duration::from_secs(config.checker_timeout_secs),
        ));
        let forge: Arc<dyn Forge> = Arc::new(GithubClient::new(
            http,
            config.api_base.clone(),
            config.bot_user_id,
            tokens.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            tokens,
            repos,
            analyzer,
            forge,
        })
    }
}
