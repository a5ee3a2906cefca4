//! Trial of Fire.
//!
//! Serve the story API over HTTP, or play in the terminal:
//!
//! ```bash
//! cargo run -p trial -- serve --addr 127.0.0.1:3000
//! cargo run -p trial -- play                       # in-process engine
//! cargo run -p trial -- play --url http://localhost:3000
//! ```
//!
//! With ANTHROPIC_API_KEY set the story is generated by Claude; otherwise
//! (or with `--offline`) only the built-in fallback story is served.
//! Logging: set RUST_LOG=debug for generator traffic.

mod headless;
mod http_backend;
mod server;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use trial_core::generator::GeneratorConfig;
use trial_core::{
    ClaudeGenerator, EndingPolicy, MemoryStore, NarrativeGenerator, StoryConfig, StoryEngine,
};

#[derive(Parser)]
#[command(name = "trial", version, about = "Trial of Fire story server and player")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the story API.
    Serve(ServeArgs),
    /// Play in the terminal.
    Play(PlayArgs),
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "TRIAL_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Idle time before a session is dropped.
    #[arg(
        long,
        env = "TRIAL_SESSION_TTL_SECS",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    session_ttl_secs: u64,

    /// How often expired sessions are swept.
    #[arg(
        long,
        env = "TRIAL_SWEEP_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    sweep_interval_secs: u64,

    #[command(flatten)]
    story: StoryArgs,
}

#[derive(Args)]
struct PlayArgs {
    /// Play against a running server instead of an in-process engine.
    #[arg(long, env = "TRIAL_URL")]
    url: Option<String>,

    #[command(flatten)]
    story: StoryArgs,
}

#[derive(Args)]
struct StoryArgs {
    /// Step at which the story must end.
    #[arg(long, env = "TRIAL_MAX_STEPS", default_value_t = trial_core::config::DEFAULT_MAX_STEPS)]
    max_steps: u32,

    /// First step where an ending is forced. Defaults to max-steps.
    #[arg(long, env = "TRIAL_ENDING_THRESHOLD")]
    ending_threshold: Option<u32>,

    /// Budget for one generator call, in milliseconds.
    #[arg(long, env = "TRIAL_GENERATION_TIMEOUT_MS", default_value_t = 5000)]
    generation_timeout_ms: u64,

    #[arg(long, value_enum, env = "TRIAL_ENDING_POLICY", default_value_t = PolicyArg::CoinFlip)]
    ending_policy: PolicyArg,

    /// Player's time limit, in seconds.
    #[arg(long, env = "TRIAL_COUNTDOWN_SECS", default_value_t = 300)]
    countdown_secs: u64,

    /// Claude model override.
    #[arg(long, env = "TRIAL_MODEL")]
    model: Option<String>,

    /// Never call the generator.
    #[arg(long)]
    offline: bool,

    /// Seed forced-ending tie-breaks.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    CoinFlip,
    FromChoices,
}

impl StoryArgs {
    fn config(&self) -> Result<StoryConfig> {
        let policy = match self.ending_policy {
            PolicyArg::CoinFlip => EndingPolicy::CoinFlip,
            PolicyArg::FromChoices => EndingPolicy::FromChoices,
        };
        let mut config = StoryConfig::new()
            .with_max_steps(self.max_steps)
            .with_generation_timeout(Duration::from_millis(self.generation_timeout_ms))
            .with_ending_policy(policy)
            .with_countdown(Duration::from_secs(self.countdown_secs));
        if let Some(threshold) = self.ending_threshold {
            config = config.with_ending_threshold(threshold);
        }
        config.validate().context("invalid story configuration")?;
        Ok(config)
    }

    fn generator(&self, config: &StoryConfig) -> Option<Arc<dyn NarrativeGenerator>> {
        if self.offline {
            info!("Offline mode: serving the built-in story");
            return None;
        }
        // The engine enforces the real budget; this only stops leaked sockets.
        let http_timeout = config.generation_timeout.saturating_mul(2);
        match ClaudeGenerator::from_env(http_timeout) {
            Ok(generator) => {
                let generator = generator.with_config(GeneratorConfig {
                    model: self.model.clone(),
                    ..GeneratorConfig::default()
                });
                info!("Generating story with Claude");
                Some(Arc::new(generator))
            }
            Err(e) => {
                warn!("No generator ({e}); serving the built-in story");
                None
            }
        }
    }

    fn engine(&self, store: Option<Arc<MemoryStore>>) -> Result<StoryEngine> {
        let config = self.config()?;
        let generator = self.generator(&config);
        let mut engine = StoryEngine::new(config)?;
        if let Some(store) = store {
            engine = engine.with_store(store);
        }
        if let Some(generator) = generator {
            engine = engine.with_generator(generator);
        }
        if let Some(seed) = self.seed {
            engine = engine.with_rng_seed(seed);
        }
        Ok(engine)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let store = Arc::new(MemoryStore::with_ttl(Duration::from_secs(
                args.session_ttl_secs,
            )));
            let engine = Arc::new(args.story.engine(Some(store.clone()))?);
            server::serve(
                args.addr,
                engine,
                store,
                Duration::from_secs(args.sweep_interval_secs),
            )
            .await
        }
        Command::Play(args) => {
            let countdown = Duration::from_secs(args.story.countdown_secs);
            match args.url {
                Some(url) => {
                    let backend = http_backend::HttpBackend::new(&url)?;
                    let session_id = backend.new_session().await?;
                    headless::run_headless(Arc::new(backend), session_id, countdown).await
                }
                None => {
                    let engine = args.story.engine(None)?;
                    let session_id = engine.new_session().await?;
                    headless::run_headless(Arc::new(engine), session_id, countdown).await
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(extra: &[&str]) -> Result<ServeArgs, clap::Error> {
        let mut argv = vec!["trial", "serve"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv)?.command {
            Command::Serve(args) => Ok(args),
            Command::Play(_) => panic!("parsed the wrong subcommand"),
        }
    }

    #[test]
    fn test_serve_defaults() {
        let args = serve_args(&[]).unwrap();
        assert_eq!(args.session_ttl_secs, 3600);
        assert_eq!(args.sweep_interval_secs, 60);
    }

    #[test]
    fn test_zero_intervals_rejected() {
        assert!(serve_args(&["--sweep-interval-secs", "0"]).is_err());
        assert!(serve_args(&["--session-ttl-secs", "0"]).is_err());
        assert_eq!(
            serve_args(&["--sweep-interval-secs", "1"])
                .unwrap()
                .sweep_interval_secs,
            1
        );
    }

    #[test]
    fn test_max_steps_moves_ending_threshold() {
        let args = serve_args(&["--max-steps", "10"]).unwrap();
        assert_eq!(args.story.config().unwrap().ending_threshold, 10);

        let args = serve_args(&["--max-steps", "10", "--ending-threshold", "6"]).unwrap();
        assert_eq!(args.story.config().unwrap().ending_threshold, 6);
    }

    #[test]
    fn test_huge_generation_timeout_does_not_overflow() {
        let huge = u64::MAX.to_string();
        let args = serve_args(&["--offline", "--generation-timeout-ms", &huge]).unwrap();
        let config = args.story.config().unwrap();
        assert_eq!(config.generation_timeout.saturating_mul(2), Duration::MAX);
        assert!(args.story.generator(&config).is_none());
    }
}
