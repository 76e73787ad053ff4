use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use reqgenome::{
    AppSession, Config, GenomeStore, HistoryEntry, MicrophoneBackend, RequirementGenome,
    ResolutionKind, SessionEvent, TaskStatus, ViewCoordinator, ViewSelection,
};

#[derive(Parser)]
#[command(name = "reqgenome", about = "Iterative requirement-analysis client")]
struct Cli {
    /// Config file name (optional; built-in defaults apply without one)
    #[arg(long, default_value = "config/reqgenome")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit feedback and wait for the round to resolve
    Submit {
        /// Feedback text; omitted at round 0 submits the bootstrap prompt
        text: Option<String>,
    },
    /// Record from the microphone until Enter, then transcribe
    Record,
    /// Show the live status and genome
    Status,
    /// List archived rounds
    History,
    /// Show an archived round by history position
    View { index: usize },
    /// Export the current resolved document as a date-named JSON file
    Export {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Clear all history and requirement data
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Submit { text } => submit(&cfg, text).await,
        Command::Record => record(&cfg).await,
        Command::Status => status(&cfg),
        Command::History => history(&cfg),
        Command::View { index } => view(&cfg, index),
        Command::Export { out } => export(&cfg, &out),
        Command::Reset { yes } => reset(&cfg, yes).await,
    }
}

async fn submit(cfg: &Config, text: Option<String>) -> Result<()> {
    let (session, mut events) = AppSession::from_config(cfg)?;

    if let Some(text) = text {
        session.push_feedback(&text);
    }

    match session.submit().await? {
        None => println!("Nothing to submit: feedback is empty past round 0."),
        Some(task_id) => {
            println!("Task {} queued, polling...", task_id);
            wait_for_resolution(&session, &mut events).await;
        }
    }

    session.shutdown();
    Ok(())
}

async fn wait_for_resolution(session: &AppSession, events: &mut mpsc::Receiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::StatusChanged(status) => match status {
                TaskStatus::Queued | TaskStatus::Processing => {
                    println!("  ... {}", status.label())
                }
                _ => {}
            },
            SessionEvent::RoundResolved { round, kind } => {
                match kind {
                    ResolutionKind::Completed => println!("Round {} completed.", round),
                    ResolutionKind::Clarifying => {
                        println!("Round {}: the backend needs clarification.", round)
                    }
                }
                print_genome(&session.store().genome());
                break;
            }
            SessionEvent::TaskFailed { message } => {
                eprintln!("Generation failed: {}", message);
                break;
            }
            _ => {}
        }
    }
}

async fn record(cfg: &Config) -> Result<()> {
    let (session, mut events) = AppSession::from_config(cfg)?;

    let backend = Box::new(MicrophoneBackend::new(cfg.backend_config()));
    session.start_recording(backend).await?;

    println!("Recording... press Enter to stop.");
    read_line().await?;

    session.stop_recording().await?;
    println!("Transcribing...");

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::TranscriptReady { text } => {
                println!("Transcript: {}", text);
                break;
            }
            SessionEvent::TranscriptFailed { message } => {
                eprintln!("Failed to transcribe audio: {}", message);
                session.shutdown();
                return Ok(());
            }
            _ => {}
        }
    }

    println!("Submit the transcript as feedback now? [y/N]");
    if read_line().await?.trim().eq_ignore_ascii_case("y") {
        if let Some(task_id) = session.submit().await? {
            println!("Task {} queued, polling...", task_id);
            wait_for_resolution(&session, &mut events).await;
        }
    } else {
        println!(
            "Pending feedback kept for this run only: {:?}",
            session.pending_feedback()
        );
    }

    session.shutdown();
    Ok(())
}

fn status(cfg: &Config) -> Result<()> {
    let store = GenomeStore::open(&cfg.state.dir)?;

    match store.status() {
        Some(status) => {
            println!("Status: {}", status.label());
            if let TaskStatus::Failed { error: Some(e) } = &status {
                println!("Error: {}", e);
            }
            if status.document().is_some() {
                println!("A resolved document is available (use `export`).");
            }
        }
        None => println!("No analysis has been run yet."),
    }

    print_genome(&store.genome());
    Ok(())
}

fn history(cfg: &Config) -> Result<()> {
    let store = GenomeStore::open(&cfg.state.dir)?;
    let entries = store.history();

    if entries.is_empty() {
        println!("No archived rounds.");
        return Ok(());
    }

    for (index, entry) in entries.iter().enumerate() {
        println!("{:>3}  {}", index, describe_entry(entry));
    }
    Ok(())
}

fn view(cfg: &Config, index: usize) -> Result<()> {
    let store = Arc::new(GenomeStore::open(&cfg.state.dir)?);
    let coordinator = ViewCoordinator::new(Arc::clone(&store));
    let snapshot = coordinator.snapshot_of(ViewSelection::Round(index));

    match &snapshot.entry {
        Some(entry) => println!("History position {}: {}", index, describe_entry(entry)),
        None => println!("No entry at position {}; showing current state.", index),
    }
    print_genome(&snapshot.genome);
    Ok(())
}

fn export(cfg: &Config, out: &PathBuf) -> Result<()> {
    let store = Arc::new(GenomeStore::open(&cfg.state.dir)?);
    let coordinator = ViewCoordinator::new(store);
    let path = coordinator.export_document(out)?;
    println!("Exported to {}", path.display());
    Ok(())
}

async fn reset(cfg: &Config, yes: bool) -> Result<()> {
    if !yes {
        println!("This clears all history and requirement data. Type 'yes' to confirm:");
        if read_line().await?.trim() != "yes" {
            println!("Aborted.");
            return Ok(());
        }
    }

    let store = GenomeStore::open(&cfg.state.dir)?;
    store.reset();
    println!("Session reset.");
    Ok(())
}

fn describe_entry(entry: &HistoryEntry) -> String {
    let kind = match entry.status {
        ResolutionKind::Completed => "completed",
        ResolutionKind::Clarifying => "clarifying",
    };
    let document = if entry.resolution.document.is_some() {
        ", document"
    } else {
        ""
    };
    let clarifications = entry
        .resolution
        .clarifications_needed
        .as_ref()
        .map(|qs| format!(", {} open question(s)", qs.len()))
        .unwrap_or_default();
    format!(
        "round {} ({}{}{})",
        entry.resolution.round, kind, document, clarifications
    )
}

fn print_genome(genome: &RequirementGenome) {
    println!("Round: {}", genome.round);
    if !genome.requirements_summary.is_empty() {
        println!("Summary:\n{}", genome.requirements_summary);
    }
    print_list("Features", &genome.features);
    print_list("User stories", &genome.user_stories);
    print_list("Constraints", &genome.constraints);
    print_list("Clarifications needed", &genome.clarifications_needed);
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}:", label);
    for item in items {
        println!("  - {}", item);
    }
}

async fn read_line() -> Result<String> {
    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    reader.read_line(&mut line).await?;
    Ok(line)
}
