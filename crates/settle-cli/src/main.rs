use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use settle_cache::RuleKeyLedger;
use settle_core::{RuleId, RunId};
use settle_engine::{BuildGraph, Config, Engine, ShellAction};
use settle_report::{BuildReport, ReportStore};

#[derive(Parser)]
#[command(name = "settle", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create .settle/ with a default config
    Init,

    /// Validate a build graph and list its rules in build order
    Check {
        #[arg(long, default_value = "settle.yaml")]
        graph: PathBuf,
    },

    /// Build targets (all rules when none are given)
    Build {
        #[arg(long, default_value = "settle.yaml")]
        graph: PathBuf,
        #[arg(long = "target")]
        targets: Vec<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Keep building independent rules after a failure
        #[arg(long)]
        keep_going: bool,
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print the stored report of an earlier run
    Report {
        #[arg(long)]
        run: String,
        #[arg(long)]
        json: bool,
    },
}

fn runs_dir(root: &Path) -> PathBuf {
    root.join(".settle").join("runs")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            let path = Config::config_path(&repo_root);
            if path.exists() {
                println!("Config already present at {}", path.display());
            } else {
                Config::default().save_to(&path)?;
                println!("Initialized settle in {}", repo_root.display());
            }
        }
        Command::Check { graph } => {
            let graph = BuildGraph::load(&repo_root.join(graph))?;
            for rule in graph.closure(&[])? {
                println!("- {}", rule);
            }
            println!("{} rules OK", graph.len());
        }
        Command::Build {
            graph,
            targets,
            json,
            keep_going,
            workers,
        } => {
            let mut cfg = Config::load_or_default(&repo_root)?;
            if keep_going {
                cfg.engine.keep_going = true;
            }
            if let Some(workers) = workers {
                cfg.engine.workers = workers;
            }

            let graph = BuildGraph::load(&repo_root.join(graph))?;
            let ledger = RuleKeyLedger::open(&Config::ledger_path(&repo_root))?;
            let caches = cfg.cache_tiers();
            let action = ShellAction::new(repo_root.clone());
            let targets: Vec<RuleId> = targets.into_iter().map(RuleId::from_str).collect();

            let engine = Engine::new(&cfg, &graph, &action, &caches, &ledger);
            let run = engine.run(&targets)?;
            ledger.save()?;

            let report = BuildReport::from_run(&run);
            let run_dir = ReportStore::new(runs_dir(&repo_root)).write(&report)?;
            tracing::debug!(dir = %run_dir.display(), "report written");

            if json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.render_human());
                println!("run {}", report.run_id);
            }
            if !report.succeeded {
                std::process::exit(1);
            }
        }
        Command::Report { run, json } => {
            let store = ReportStore::new(runs_dir(&repo_root));
            let run_id = RunId::from_str(run);
            if json {
                println!("{}", serde_json::to_string_pretty(&store.read_json(&run_id)?)?);
            } else {
                print!("{}", store.read_text(&run_id)?);
            }
        }
    }

    Ok(())
}
