mod case;
mod cli;
mod config;
mod judge;
mod outcome;
mod report;
mod results;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlagent::io::config::load_config;

#[derive(Parser)]
#[command(name = "eval", version, about = "Evaluation harness for sqlagent")]
struct Cli {
    /// Agent config; relative paths inside it resolve against its directory.
    #[arg(long, global = true, default_value = "sqlagent/sqlagent.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    List,
    Run {
        case_id: String,
        #[arg(long, default_value_t = 1)]
        runs: u32,
    },
    Report {
        case_id: String,
    },
    Clean {
        case_id: String,
    },
}

fn main() -> Result<()> {
    sqlagent::logging::init();
    let cli = Cli::parse();
    let repo_root = std::env::current_dir()?;
    let eval_root = repo_root.join("eval");
    match cli.command {
        Command::List => cli::list_cases(&eval_root),
        Command::Run { case_id, runs } => {
            let config_path = repo_root.join(&cli.config);
            let base = config_path.parent().unwrap_or(&repo_root);
            let cfg = load_config(&config_path)?.resolve_paths(base);
            cli::run_case_by_id(&eval_root, &cfg, &case_id, runs)
        }
        Command::Report { case_id } => cli::report_case(&eval_root, &case_id),
        Command::Clean { case_id } => cli::clean_case(&eval_root, &case_id),
    }
}
