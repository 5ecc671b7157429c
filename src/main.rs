use activity_log::ActivityLog;
use anyhow::Context;
use autoreply_core::{load_required_forums, BotConfig, Credentials, ErrorExt};
use background_service::{
    BackgroundService, Clock, SchedulerState, ShutdownSignal, ShutdownTrigger, SystemClock,
};
use clap::Parser;
use llm_interface::OpenRouterProvider;
use reddit_client::{RedditClient, RedditOAuth2Config};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str =
    "info,autoreply=info,autoreply_core=info,reddit_client=info,llm_interface=info,activity_log=info,background_service=info";

/// Automated reply agent for Reddit.
#[derive(Parser, Debug)]
#[command(name = "autoreply", version, about)]
struct Cli {
    /// TOML file with scheduler tunables; defaults apply when omitted
    #[arg(long, env = "AUTOREPLY_CONFIG")]
    config: Option<PathBuf>,

    /// Newline-delimited subreddit list, re-read every cycle
    #[arg(long, env = "AUTOREPLY_FORUMS", default_value = "subreddits.txt")]
    forums: PathBuf,

    /// Activity log of submitted replies
    #[arg(long, env = "AUTOREPLY_HISTORY", default_value = "comment_history.txt")]
    history: PathBuf,

    /// Directory for bot.log
    #[arg(long, env = "AUTOREPLY_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,
}

fn init_logging(log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let log_path = log_dir.join("bot.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}

/// Fires the trigger on Ctrl-C, or SIGTERM on Unix.
async fn listen_for_stop(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Stop requested, finishing current step");
    trigger.trigger();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_dir)?;

    let clock = SystemClock;
    let started_at = clock.now();
    info!("==================================================");
    info!(
        "Autoreply v{} starting at {}",
        env!("CARGO_PKG_VERSION"),
        started_at.format("%Y-%m-%d %H:%M:%S")
    );
    info!("==================================================");

    let credentials = Credentials::from_env().map_err(|e| {
        error!("{}", e);
        e
    })?;
    info!(
        "Loaded credentials for u/{} (client {})",
        credentials.reddit_username,
        credentials.masked_client_id()
    );

    let config = BotConfig::load(cli.config.as_deref()).map_err(|e| {
        e.log_error();
        e
    })?;
    let forums = load_required_forums(&cli.forums).map_err(|e| {
        e.log_error();
        e
    })?;
    info!("Watching {} subreddit(s): {}", forums.len(), forums.join(", "));

    let log = ActivityLog::new(&cli.history);
    log.initialize(started_at).await?;
    let dedup = log.load_dedup_set().await?;
    info!("Loaded {} previously answered post(s)", dedup.len());

    let reddit = RedditClient::new(RedditOAuth2Config::new(
        credentials.client_id.clone(),
        credentials.client_secret.clone(),
        credentials.reddit_username.clone(),
        credentials.reddit_password.clone(),
        credentials.user_agent.clone(),
    ))?;
    let account = reddit.verify_account().await.map_err(|e| {
        error!("Reddit authentication failed: {}", e.user_friendly_message());
        e
    })?;
    info!(
        "Authenticated as u/{}: account age {} day(s), {} karma",
        account.name,
        account.account_age_days(chrono::Utc::now().timestamp()),
        account.total_karma()
    );

    let llm = OpenRouterProvider::new(credentials.openrouter_api_key.clone())?
        .with_model(credentials.llm_model.clone())
        .with_base_url(credentials.llm_base_url.clone());
    info!("Generating replies with {} via {}", llm.model(), llm.base_url());

    let (trigger, shutdown) = ShutdownSignal::channel();
    tokio::spawn(listen_for_stop(trigger));

    let service = BackgroundService::new(reddit, llm, clock, log, config, shutdown)
        .with_forums_file(&cli.forums);
    let state = service.run(SchedulerState::new(forums, dedup)).await;

    info!(
        cycles = state.cycle,
        comments = state.totals.actions,
        "Autoreply stopped after {} cycle(s). Goodbye!",
        state.cycle
    );
    Ok(())
}
