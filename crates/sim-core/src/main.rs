//! Feed Simulation Runner
//!
//! Runs agents against a post corpus for a number of turns, writing feeds,
//! actions and follow graphs to an output directory.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use feeds::{build_selectors, HashingEmbedder, InMemoryCorpus, PostCorpusProvider};
use sim_core::config::{default_config_toml, DEFAULT_CONFIG_PATH};
use sim_core::{
    load_profiles, logging, HeuristicReasoner, JsonlStore, PersistenceStore, RetryPolicy,
    RunOrchestrator, RunSummary, SimConfig, SimError,
};
use sim_records::{FeedStrategy, Run};

/// Command line arguments for the simulation
#[derive(Parser, Debug)]
#[command(name = "feed_sim")]
#[command(about = "Simulates agents reading and reacting to social feeds")]
struct Args {
    /// TOML config file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Post corpus (JSONL, one post per line)
    #[arg(long)]
    posts: Option<PathBuf>,

    /// Agent profiles (JSONL, one profile per line)
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Number of agents
    #[arg(long)]
    agents: Option<usize>,

    /// Number of turns
    #[arg(long)]
    turns: Option<u32>,

    /// Posts per feed
    #[arg(long)]
    k: Option<usize>,

    /// Feed strategy; repeat for several
    #[arg(long = "strategy")]
    strategies: Vec<FeedStrategy>,

    /// Output directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Random seed for the offline reasoner
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Continue an interrupted run
    #[arg(long, value_name = "RUN_ID")]
    resume: Option<String>,

    /// List recorded runs and exit
    #[arg(long)]
    list_runs: bool,

    /// Log filter; overrides RUST_LOG and the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Print the default configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

impl Args {
    /// Applies command line overrides on top of the file config.
    fn apply(&self, config: &mut SimConfig) {
        if let Some(n) = self.agents {
            config.run.num_agents = n;
        }
        if let Some(n) = self.turns {
            config.run.num_turns = n;
        }
        if let Some(k) = self.k {
            config.run.feed_size_k = k;
        }
        if !self.strategies.is_empty() {
            config.run.feed_strategies = self.strategies.iter().copied().collect();
        }
        if let Some(dir) = &self.output {
            config.persistence.output_dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.print_default_config {
        return match default_config_toml() {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let mut config = match SimConfig::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);
    logging::init_logging(&config.logging.level, args.log_level.as_deref());

    match run(&args, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, config: &SimConfig) -> Result<(), SimError> {
    let store = Arc::new(JsonlStore::open(&config.persistence.output_dir)?);

    if args.list_runs {
        for run in store.list_runs()? {
            print_run(&run);
        }
        return Ok(());
    }

    config.validate()?;
    let posts_path = args
        .posts
        .as_ref()
        .ok_or_else(|| SimError::Configuration("--posts is required".into()))?;
    let profiles_path = args
        .profiles
        .as_ref()
        .ok_or_else(|| SimError::Configuration("--profiles is required".into()))?;

    let corpus = Arc::new(InMemoryCorpus::from_jsonl_file(posts_path)?);
    let profiles = load_profiles(profiles_path)?;
    tracing::info!(
        posts = corpus.len(),
        profiles = profiles.len(),
        output = %config.persistence.output_dir.display(),
        "inputs loaded"
    );

    let embedder = Arc::new(HashingEmbedder::new(config.embedding.dimensions));
    let strategies = match &args.resume {
        Some(run_id) => store
            .get_run(run_id)?
            .map(|run| run.strategies)
            .unwrap_or_else(|| config.run.feed_strategies.clone()),
        None => config.run.feed_strategies.clone(),
    };
    let selectors = build_selectors(
        &strategies,
        embedder,
        &corpus.all_posts()?,
        &config.feeds_config(),
    )?;

    let mut orchestrator = RunOrchestrator::new(
        store,
        corpus,
        selectors,
        Arc::new(HeuristicReasoner::new(args.seed)),
    )
    .with_session_config(config.session.clone())
    .with_retry(RetryPolicy::from_config(&config.persistence));

    let summary = match &args.resume {
        Some(run_id) => orchestrator.resume(run_id, &profiles).await?,
        None => {
            orchestrator
                .execute_run(&config.run_config(), &profiles)
                .await?
        }
    };
    print_summary(&summary);
    Ok(())
}

fn print_run(run: &Run) {
    let strategies: Vec<&str> = run.strategies.iter().map(|s| s.as_str()).collect();
    println!(
        "{}  {:<9}  agents={} turns={} k={} strategies={}",
        run.run_id,
        run.status.to_string(),
        run.num_agents,
        run.num_turns,
        run.feed_size_k,
        strategies.join(",")
    );
}

fn print_summary(summary: &RunSummary) {
    println!("Run {} {}", summary.run.run_id, summary.run.status);
    for turn in &summary.turns {
        let counts: Vec<String> = turn
            .total_actions
            .iter()
            .map(|(kind, n)| format!("{}={}", kind, n))
            .collect();
        println!(
            "  turn {}: {} ({} ms){}",
            turn.turn_number,
            counts.join(" "),
            turn.execution_time_ms.unwrap_or(0),
            if turn.failed_agents.is_empty() {
                String::new()
            } else {
                format!(", failed: {}", turn.failed_agents.join(", "))
            }
        );
    }
}
