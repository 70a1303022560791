use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use sqlagent::agent::Agent;
use sqlagent::config::Config;
use sqlagent::prompt::Step;
use sqlagent::runner::LoopOutcome;
use sqlagent::server;
use sqlagent::tools::ToolRegistry;
use tokio_util::sync::CancellationToken;

mod cli;

use cli::Cli;
use cli::commands::Commands;

fn setup_logging(cli: &Cli, config: &Config) -> Result<()> {
    let default_level = if cli.is_verbose() {
        "debug".to_string()
    } else {
        config.log_level.clone().unwrap_or_else(|| "info".to_string())
    };
    let env = env_logger::Env::default().default_filter_or(default_level);

    if cli.log_stderr {
        env_logger::Builder::from_env(env).init();
        return Ok(());
    }

    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sqlagent")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("sqlagent.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Serve { bind } => handle_serve_command(bind.as_deref(), config).await,
        Commands::Ask { prompt, transcript } => handle_ask_command(prompt, *transcript, config).await,
        Commands::Tools => handle_tools_command(),
    }
}

async fn handle_serve_command(bind: Option<&str>, config: Config) -> Result<()> {
    let bind = bind.map(String::from).unwrap_or_else(|| config.server.bind.clone());
    let agent = Agent::from_config(config).context("Failed to build agent")?;

    println!("{} http://{}", "Serving on".green(), bind);
    server::serve(Arc::new(agent), &bind).await.context("Server failed")?;
    Ok(())
}

async fn handle_ask_command(prompt: &str, show_transcript: bool, config: Config) -> Result<()> {
    let agent = Agent::from_config(config).context("Failed to build agent")?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let report = agent.run(prompt, &cancel).await.context("Failed to run agent")?;

    if show_transcript {
        for step in report.transcript.steps() {
            match step {
                Step::Thought { text } => println!("{} {}", "Thought:".cyan(), text),
                Step::Action { tool, input } => {
                    println!("{} {}", "Action:".yellow(), tool);
                    println!("{} {}", "Action Input:".yellow(), input);
                }
                Step::Observation { text } => println!("{} {}", "Observation:".blue(), text),
            }
        }
        println!();
    }

    match report.outcome {
        LoopOutcome::Done(answer) => {
            println!("{} {}", "Answer:".green().bold(), answer);
            Ok(())
        }
        LoopOutcome::Failed(err) => {
            eprintln!("{} [{}] {}", "Failed:".red().bold(), err.kind(), err.safe_message());
            Err(eyre::eyre!("Agent did not produce an answer: {}", err.kind()))
        }
    }
}

fn handle_tools_command() -> Result<()> {
    let registry = ToolRegistry::standard().context("Failed to build tool registry")?;
    for tool in registry.descriptors() {
        println!("{}", tool.name.green().bold());
        println!("  {}", tool.description);
        println!("  {}", tool.input.hint().dimmed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before the oracle key is resolved
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&cli, &config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
