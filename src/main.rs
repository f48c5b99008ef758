//! rampart CLI tool.

use clap::{Parser, Subcommand};
use rampart::{Engine, Phase, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "rampart")]
#[command(author, version, about = "WAF rule engine", long_about = None)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that rules parse and compile
    Check {
        /// Path to a rules file or glob
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Evaluate a request against rules
    Test {
        /// Path to a rules file or glob
        #[arg(short, long)]
        rules: PathBuf,

        /// Request URI
        #[arg(short, long)]
        uri: String,

        /// Request method
        #[arg(short, long, default_value = "GET")]
        method: String,

        /// Request headers ("Name: Value")
        #[arg(short = 'H', long)]
        header: Vec<String>,

        /// Request body
        #[arg(short, long)]
        body: Option<String>,

        /// Client address
        #[arg(long, default_value = "127.0.0.1")]
        client_ip: String,
    },

    /// Print the compiled ruleset
    Dump {
        /// Path to a rules file or glob
        #[arg(short, long)]
        rules: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Check { rules } => check_rules(&rules),
        Commands::Test {
            rules,
            uri,
            method,
            header,
            body,
            client_ip,
        } => test_request(&rules, &uri, &method, &header, body.as_deref(), &client_ip),
        Commands::Dump { rules } => dump_rules(&rules),
    }
}

fn check_rules(path: &PathBuf) -> Result<()> {
    let engine = Engine::from_file(&path.to_string_lossy())?;
    println!("Successfully compiled {} rules", engine.rule_count());
    Ok(())
}

fn test_request(
    rules_path: &PathBuf,
    uri: &str,
    method: &str,
    headers: &[String],
    body: Option<&str>,
    client_ip: &str,
) -> Result<()> {
    info!("testing request against {:?}", rules_path);

    let engine = Engine::from_file(&rules_path.to_string_lossy())?;
    let mut tx = engine.transaction();

    tx.process_connection(client_ip, 0, "127.0.0.1", 80)?;
    tx.process_uri(uri, method, "HTTP/1.1")?;
    for header in headers {
        if let Some((name, value)) = header.split_once(':') {
            tx.add_request_header(name.trim(), value.trim())?;
        }
    }

    if tx.process_request_headers()? {
        return report_blocked(&tx, 1);
    }

    if let Some(body_data) = body {
        tx.append_request_body(body_data.as_bytes())?;
    }
    if tx.process_request_body()? {
        return report_blocked(&tx, 2);
    }

    tx.process_logging()?;

    println!("ALLOWED");
    println!("  Matched rules: {:?}", tx.matched_rules());
    Ok(())
}

fn report_blocked(tx: &rampart::Transaction, phase: u8) -> Result<()> {
    let intervention = tx.intervention().expect("disrupted without intervention");
    println!("BLOCKED (Phase {})", phase);
    println!("  Status: {}", intervention.status);
    if let Some(ref url) = intervention.url {
        println!("  Redirect: {}", url);
    }
    if let Some(ref log) = intervention.log {
        println!("  Message: {}", log);
    }
    Ok(())
}

fn dump_rules(path: &PathBuf) -> Result<()> {
    let engine = Engine::from_file(&path.to_string_lossy())?;
    let ruleset = engine.ruleset();

    println!("Total rules: {}", ruleset.rule_count());
    for phase in Phase::all() {
        let rules = ruleset.phase_rules(phase);
        if rules.is_empty() {
            continue;
        }
        println!("\n  Phase {} ({}):", phase.number(), phase.name());
        for rule in rules {
            let id = rule
                .id()
                .map(|i| i.to_string())
                .unwrap_or_else(|| "no-id".to_string());
            if rule.chain_len() > 1 {
                println!("    - Rule {} (chain of {})", id, rule.chain_len());
            } else {
                println!("    - Rule {}", id);
            }
        }
    }

    Ok(())
}
