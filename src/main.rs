use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use release_checker::cache::CacheLayout;
use release_checker::command::SystemCommandRunner;
use release_checker::config::{self, DEFAULT_CONFIG_FILE, INDEX_FETCH_TIMEOUT};
use release_checker::sources::HttpIndexFetcher;
use release_checker::stage::{RunOptions, StageRunner};

#[derive(Parser)]
#[command(name = "release-checker")]
#[command(version, about = "Markdown report of package versions across release stages")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Only run the named stage (repeatable)
    #[arg(long = "name", value_name = "STAGE")]
    names: Vec<String>,

    /// Ignore cached command output and index pages
    #[arg(long)]
    no_cache: bool,

    /// Only show change requests updated in the last two weeks, in any state
    #[arg(long)]
    recent: bool,

    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Cache root; defaults to $XDG_CACHE_HOME/release-checker
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(writer)
        .init();

    let app_config = config::load_config(&cli.config)?;
    if app_config.stages.is_empty() {
        bail!("No stages configured in {}", cli.config.display());
    }
    if app_config.rpms.is_empty() {
        warn!("No packages configured under 'rpms'; tables will be empty");
    }

    let layout = CacheLayout::new(cli.cache_dir.unwrap_or_else(config::cache_dir));
    info!("Using cache directory {}", layout.root().display());

    let options = RunOptions {
        names: cli.names,
        no_cache: cli.no_cache,
        recent: cli.recent,
        today: chrono::Local::now().date_naive(),
    };
    if options.no_cache {
        warn!("Command cache disabled; every command runs again");
    }

    let runner = SystemCommandRunner::with_cache_layout(layout.clone());
    let fetcher = HttpIndexFetcher::new(INDEX_FETCH_TIMEOUT)?;
    let stage_runner = StageRunner::new(&app_config, &layout, &runner, &fetcher, options);
    stage_runner.check_tools()?;

    let report = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(stage_runner.run());

    print!("{}", report);
    Ok(())
}
