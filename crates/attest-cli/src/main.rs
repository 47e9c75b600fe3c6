//! attest CLI - behavior verification against a running web app
//!
//! Usage:
//!   attest init                        Write .attest/config.toml
//!   attest classify <instruction>      Show how a Check instruction is resolved
//!   attest chain <catalog> <behavior>  Print a behavior's dependency chain
//!   attest run <catalog>               Verify behaviors in a browser

use anyhow::{Context, Result};
use attest_browser::{BrowserConfig, BrowserSession, HttpAgent, SnapshotDiffOracle};
use attest_core::{
    classify, parse_deterministic, quoted_text_expectation, AttestConfig, BehaviorStatus, Catalog,
};
use attest_engine::{build_chain, detect_intent, intent_name, Adapters, RunReport, ScenarioRunner, SuiteRunner};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "attest")]
#[command(author, version, about = "Verify natural-language behaviors against a web app")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Project path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show how an instruction would be handled
    Classify {
        /// Instruction text
        instruction: String,
    },

    /// Print the ordered dependency chain for a behavior
    Chain {
        /// Behavior catalog (JSON)
        catalog: PathBuf,

        /// Target behavior id
        behavior: String,
    },

    /// Verify behaviors in a browser
    Run {
        /// Behavior catalog (JSON)
        catalog: PathBuf,

        /// Behavior ids to verify (defaults to all)
        #[arg(short, long = "behavior", value_name = "ID")]
        behaviors: Vec<String>,

        /// Override the configured base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Write the JSON run report here
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Classify { instruction } => cmd_classify(&instruction),
        Commands::Chain { catalog, behavior } => cmd_chain(&catalog, &behavior),
        Commands::Run {
            catalog,
            behaviors,
            base_url,
            report,
            headed,
        } => {
            let report = cmd_run(&catalog, behaviors, base_url, report, headed).await?;
            if !report.all_passed() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn load_config() -> Result<AttestConfig> {
    AttestConfig::load_or_default(Path::new(".")).context("Failed to load .attest/config.toml")
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::load(path).with_context(|| format!("Failed to load catalog {}", path.display()))
}

fn cmd_init(path: &Path) -> Result<()> {
    info!("Initializing attest in {:?}", path);
    AttestConfig::write_default(path).context("Failed to write default config")?;

    println!("Initialized attest in {:?}", path);
    println!("Created:");
    println!("  .attest/config.toml");
    Ok(())
}

fn cmd_classify(instruction: &str) -> Result<()> {
    println!("As a Check: {:?}", classify(instruction));
    match parse_deterministic(instruction) {
        Some(check) => println!("  inspection: {:?}", check),
        None => match quoted_text_expectation(instruction) {
            Some(expectation) => println!(
                "  literal text {:?} expected {}",
                expectation.phrase,
                if expectation.present { "present" } else { "absent" }
            ),
            None => println!("  judged by the dual oracles"),
        },
    }
    println!("As an Act: {} ({:?})", intent_name(instruction), detect_intent(instruction));
    Ok(())
}

fn cmd_chain(catalog_path: &Path, behavior: &str) -> Result<()> {
    let config = load_config()?;
    let catalog = load_catalog(catalog_path)?;
    let chain = build_chain(behavior, &catalog, config.chain.cycle_policy)
        .with_context(|| format!("Cannot build chain for {}", behavior))?;

    for (index, link) in chain.iter().enumerate() {
        match &link.scenario {
            Some(scenario) => println!("{}. {} ({})", index + 1, link.behavior_id, scenario),
            None => println!("{}. {}", index + 1, link.behavior_id),
        }
    }
    Ok(())
}

async fn cmd_run(
    catalog_path: &Path,
    behaviors: Vec<String>,
    base_url: Option<String>,
    report_path: Option<PathBuf>,
    headed: bool,
) -> Result<RunReport> {
    let mut config = load_config()?;
    if let Some(url) = base_url {
        config.base_url = url;
    }
    if headed {
        config.browser.headless = false;
    }
    let catalog = load_catalog(catalog_path)?;

    info!("Launching browser (headless: {})", config.browser.headless);
    let session = Arc::new(
        BrowserSession::launch_with_config(BrowserConfig::from(&config.browser))
            .await
            .context("Failed to launch browser")?,
    );
    let agent = Arc::new(HttpAgent::from_config(&config.agent).context("Failed to create agent client")?);
    let oracle = Arc::new(SnapshotDiffOracle::new(agent.clone()));
    let adapters = Adapters::new(session.clone(), agent.clone(), agent, oracle);

    let executor = Arc::new(ScenarioRunner::new(adapters, config.clone()));
    let suite = SuiteRunner::new(config, executor);
    let report = if behaviors.is_empty() {
        suite.verify_all(&catalog).await
    } else {
        suite.verify(&catalog, &behaviors).await
    };
    drop(suite);

    print_report(&report);

    if let Some(path) = report_path {
        let json = report.to_json().context("Failed to serialize run report")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    if let Ok(session) = Arc::try_unwrap(session) {
        session.close().await.context("Failed to close browser")?;
    }
    Ok(report)
}

fn print_report(report: &RunReport) {
    println!();
    println!("Run {} against {}", report.run_id, report.base_url);
    for result in &report.results {
        let marker = match result.status {
            BehaviorStatus::Pass => "PASS",
            BehaviorStatus::Fail => "FAIL",
            BehaviorStatus::DependencyFailed => "SKIP",
        };
        println!("  [{}] {} ({} ms)", marker, result.title, result.duration_ms);
        if let Some(dependency) = &result.failed_dependency {
            println!("         dependency failed: {}", dependency);
        }
        if let Some(error) = &result.error {
            println!("         {}", error);
        }
    }
    println!(
        "{} passed, {} failed, {} dependency-failed",
        report.passed, report.failed, report.dependency_failed
    );
}
