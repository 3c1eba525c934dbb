use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

use symposium::compose;
use symposium::domain::SymposiumEvent;
use symposium::events::{BroadcastSink, EventSink};
use symposium::llm::{Generator, OpenAiGenerator};
use symposium::portable;
use symposium::scheduler::SymposiumRegistry;
use symposium::store::{ConversationStore, SqliteStore, UserStore};

fn setup_logging(config: &Config) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("symposium")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("symposium.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_store(cli: &Cli, config: &Config) -> Result<Arc<SqliteStore>> {
    let path = cli.database.clone().unwrap_or_else(|| config.storage.database_path.clone());
    let store = SqliteStore::open(&path).context(format!("Failed to open database {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { ids, all } => handle_run_command(cli, config, ids, *all).await,
        Commands::Echo { id, content } => handle_echo_command(cli, config, id, content).await,
        Commands::Export { id, name, output } => {
            handle_export_command(cli, config, id, name.as_deref(), output.as_ref())
        }
        Commands::Import { file, id } => handle_import_command(cli, config, file, id),
        Commands::Validate { file } => handle_validate_command(file),
    }
}

async fn handle_run_command(cli: &Cli, config: &Config, ids: &[String], all: bool) -> Result<()> {
    let store = open_store(cli, config)?;

    let mut targets: Vec<String> = ids.to_vec();
    if all {
        targets.extend(store.list_symposiums()?);
    }
    targets.sort();
    targets.dedup();

    if targets.is_empty() {
        bail!("No symposiums to run; pass conversation ids or --all");
    }

    let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::new(config.generation.to_openai())?);
    let sink = Arc::new(BroadcastSink::default());
    let printer = tokio::spawn(print_events(sink.subscribe(), cli.is_verbose()));

    let conversations: Arc<dyn ConversationStore> = store.clone();
    let users: Arc<dyn UserStore> = store;
    let events: Arc<dyn EventSink> = sink.clone();
    let registry = SymposiumRegistry::new(
        conversations,
        users,
        generator,
        events,
        config.scheduler.to_settings(),
    );

    for id in &targets {
        registry.start(id).await;
    }
    println!(
        "{} {} symposium(s), Ctrl-C to stop",
        "Running:".green(),
        targets.len()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("{}", "Stopping symposiums...".yellow());
    registry.shutdown().await;

    // The printer exits once every sender is gone
    drop(registry);
    drop(sink);
    let _ = printer.await;
    Ok(())
}

async fn print_events(mut rx: broadcast::Receiver<SymposiumEvent>, verbose: bool) {
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event, verbose),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                println!("{} {} events skipped", "Lagged:".yellow(), skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &SymposiumEvent, verbose: bool) {
    match event {
        SymposiumEvent::Started { conversation_id } => {
            println!("{} {}", "Started:".green(), conversation_id);
        }
        SymposiumEvent::Stopped { conversation_id } => {
            println!("{} {}", "Stopped:".red(), conversation_id);
        }
        SymposiumEvent::Message { conversation_id, message } => {
            println!(
                "{} {}",
                format!("[{}] {}:", conversation_id, message.author()).cyan(),
                message.content
            );
        }
        SymposiumEvent::Status {
            conversation_id,
            model,
            status: Some(status),
            error: true,
            ..
        } => {
            println!("{} {} {}: {}", "Error:".red(), conversation_id, model, status);
        }
        other if verbose => {
            println!("{} {}", other.topic().dimmed(), other.payload());
        }
        _ => {}
    }
}

async fn handle_echo_command(cli: &Cli, config: &Config, id: &str, content: &str) -> Result<()> {
    let store: Arc<dyn ConversationStore> = open_store(cli, config)?;
    match compose::splice_echo(&store, id, content).await? {
        Some(message) => {
            println!("{} {}", "Spliced:".green(), message.content);
            Ok(())
        }
        None => Err(eyre!("Conversation not found: {}", id)),
    }
}

fn handle_export_command(
    cli: &Cli,
    config: &Config,
    id: &str,
    name: Option<&str>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let store = open_store(cli, config)?;
    let conversation = store
        .get_conversation(id)?
        .ok_or_else(|| eyre!("Conversation not found: {}", id))?;

    let export = portable::export_config(&conversation, name);
    let json = export.to_json_pretty()?;

    match output {
        Some(dir) => {
            fs::create_dir_all(dir).context("Failed to create output directory")?;
            let path = dir.join(portable::file_name(&export));
            fs::write(&path, json).context(format!("Failed to write {}", path.display()))?;
            println!("{} {}", "Exported:".green(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn handle_import_command(cli: &Cli, config: &Config, file: &PathBuf, id: &str) -> Result<()> {
    let raw = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    let export = portable::import_config(&raw)?;

    let store = open_store(cli, config)?;
    let conversation = store
        .get_conversation(id)?
        .ok_or_else(|| eyre!("Conversation not found: {}", id))?;

    store.set_config(id, &export.apply_to(&conversation.config))?;
    store.set_mode(id, "symposium")?;

    info!("Imported '{}' into {}", export.name, id);
    println!("{} '{}' -> {}", "Imported:".green(), export.name, id);
    Ok(())
}

fn handle_validate_command(file: &PathBuf) -> Result<()> {
    let raw = fs::read_to_string(file).context(format!("Failed to read {}", file.display()))?;
    match portable::import_config(&raw) {
        Ok(export) => {
            println!("{} {} ({} models)", "Valid:".green(), export.name, export.config.models.len());
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Invalid:".red(), e);
            bail!("{} is not a valid symposium configuration", file.display())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Loaded config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
