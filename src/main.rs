use anyhow::{Context as _, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use typecheckd::config::BotConfig;
use typecheckd::{webhook, AppContext};

#[derive(Parser)]
#[command(
    name = "typecheckd",
    about = "typecheckd — diff-aware type-check review bot for GitHub pull requests",
    version
)]
struct Args {
    /// Webhook HTTP port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Bind address (0.0.0.0 so the forge can reach the webhook)
    #[arg(long, env = "TYPECHECKD_BIND", default_value = "0.0.0.0")]
    bind_address: String,

    /// Directory reviewed repositories are cloned under
    #[arg(long, env = "TYPECHECKD_REPOS_DIR", default_value = ".")]
    repos_dir: std::path::PathBuf,

    /// Webhook secret shared with the GitHub App settings
    #[arg(long, env = "GH_SECRET", hide_env_values = true)]
    webhook_secret: String,

    /// GitHub App id
    #[arg(long, env = "GH_APP_ID")]
    app_id: String,

    /// GitHub App private key, PEM
    #[arg(long, env = "GH_PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// The bot's own user id — used to pick its reviews out of a PR
    #[arg(long, env = "GH_REVIEW_USER")]
    bot_user_id: u64,

    /// GitHub API base URL
    #[arg(long, env = "TYPECHECKD_API_BASE", default_value = "https://api.github.com")]
    api_base: String,

    /// Type checker binary to run against reviewed trees
    #[arg(long, env = "TYPECHECKD_CHECKER", default_value = "mypy")]
    checker_bin: String,

    /// Checker timeout, seconds
    #[arg(long, env = "TYPECHECKD_CHECKER_TIMEOUT", default_value_t = 300)]
    checker_timeout_secs: u64,

    /// Log filter (e.g. "typecheckd=debug")
    #[arg(long, env = "TYPECHECKD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "TYPECHECKD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(&args);

    let config = BotConfig {
        port: args.port,
        bind_address: args.bind_address,
        repos_dir: args.repos_dir,
        webhook_secret: args.webhook_secret,
        app_id: args.app_id,
        private_key: args.private_key,
        bot_user_id: args.bot_user_id,
        api_base: args.api_base,
        checker_bin: args.checker_bin,
        checker_timeout_secs: args.checker_timeout_secs,
    };

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .context("invalid bind address")?;
    let ctx = Arc::new(AppContext::new(config)?);
    let router = webhook::build_router(ctx);

    info!("webhook listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::new(
            args.log
                .as_deref()
                .unwrap_or("typecheckd=info,tower_http=info"),
        ),
    };

    match &args.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let file = path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("typecheckd.log"));
            let appender = tracing_appender::rolling::daily(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
