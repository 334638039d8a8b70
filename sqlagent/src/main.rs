use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlagent::agent::SqlAgent;
use sqlagent::core::safety;
use sqlagent::core::types::SessionResult;
use sqlagent::exit_codes;
use sqlagent::io::catalog::load_catalog;
use sqlagent::io::config::{AgentConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use sqlagent::io::prompt::render_schema;
use sqlagent::io::transcript::{transcript_path, write_transcript};
use sqlagent::logging;

#[derive(Parser)]
#[command(
    name = "sqlagent",
    version,
    about = "Self-correcting natural-language-to-SQL agent"
)]
struct Cli {
    /// Config file; relative paths inside it resolve against its directory.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a config file with every key at its default.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Answer a question against the configured database.
    Ask {
        question: String,
        /// Print the full session record as JSON instead of a summary.
        #[arg(long)]
        json: bool,
        /// Also write the session record to a file in this directory.
        #[arg(long)]
        transcript_dir: Option<PathBuf>,
    },
    /// Run the safety filter on a SQL string and print the cleaned form.
    Check { sql: String },
    /// Print the schema block the generator sees.
    Schema {
        /// Comma-separated table names to project the catalog onto.
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Ask {
            question,
            json,
            transcript_dir,
        } => cmd_ask(&cli.config, &question, json, transcript_dir.as_deref()),
        Command::Check { sql } => Ok(cmd_check(&sql)),
        Command::Schema { tables } => cmd_schema(&cli.config, &tables),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        eprintln!(
            "config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
        return Ok(exit_codes::INVALID);
    }
    write_config(config_path, &AgentConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn config(path: &Path) -> Result<AgentConfig> {
    let cfg = load_config(path)?;
    let base = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().context("resolve current directory")?,
    };
    Ok(cfg.resolve_paths(&base))
}

fn cmd_ask(
    config_path: &Path,
    question: &str,
    json: bool,
    transcript_dir: Option<&Path>,
) -> Result<i32> {
    let cfg = config(config_path)?;
    let mut agent = SqlAgent::from_config(&cfg)?;
    let result = agent.ask(question);

    if let Some(dir) = transcript_dir {
        let path = transcript_path(dir);
        write_transcript(&path, &result)?;
        eprintln!("transcript: {}", path.display());
    }
    if json {
        let payload = serde_json::to_string_pretty(&result).context("serialize session result")?;
        println!("{payload}");
    } else {
        print_result(&result);
    }

    Ok(if result.answered() {
        exit_codes::OK
    } else {
        exit_codes::CLARIFICATION
    })
}

fn print_result(result: &SessionResult) {
    println!("{}", "=".repeat(60));
    println!("Question: {}", result.question);
    if !result.planned_tables.is_empty() {
        println!("Tables: {}", result.planned_tables.join(", "));
    }
    if let Some(sql) = &result.sql {
        println!("SQL: {sql}");
    }
    println!(
        "Valid: {}  Executed: {}  Attempts: {}",
        result.valid, result.executed, result.total_attempts
    );
    if !result.attempted_strategies.is_empty() {
        let strategies: Vec<&str> = result
            .attempted_strategies
            .iter()
            .map(|strategy| strategy.as_str())
            .collect();
        println!("Strategies: {}", strategies.join(", "));
    }
    if let Some(failure_type) = result.failure_type {
        println!("Last failure: {}", failure_type.as_str());
    }
    println!("{}", "-".repeat(60));
    println!("{}", result.nl_response);
    if let Some(rows) = result.results.as_ref().filter(|rows| result.valid && !rows.is_empty()) {
        println!("{}", "-".repeat(60));
        println!("{}", rows.columns.join(" | "));
        for row in rows.rows.iter().take(10) {
            let cells: Vec<String> = row.iter().map(|value| value.to_string()).collect();
            println!("{}", cells.join(" | "));
        }
        if rows.len() > 10 {
            println!("... {} more rows", rows.len() - 10);
        }
    }
}

fn cmd_check(sql: &str) -> i32 {
    match safety::validate(sql) {
        Ok(cleaned) => {
            println!("{cleaned}");
            exit_codes::OK
        }
        Err(violation) => {
            eprintln!("rejected: {violation}");
            exit_codes::INVALID
        }
    }
}

fn cmd_schema(config_path: &Path, tables: &[String]) -> Result<i32> {
    let cfg = config(config_path)?;
    let catalog = load_catalog(&cfg.schema.path)?;
    let catalog = if tables.is_empty() {
        catalog
    } else {
        catalog.project(tables)
    };
    println!("{}", render_schema(&catalog));
    Ok(exit_codes::OK)
}
