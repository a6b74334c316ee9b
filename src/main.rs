//! Recap CLI - summarise text selections
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use recap::{
    ui, ClearMode, ConfigSource, ExportOutcome, Provider, StoreEvent, SummarizerClient, SummaryStore,
};
use std::io::Read;
use std::path::PathBuf;
use tokio::sync::broadcast::Receiver;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recap")]
#[command(author, version, about = "Summarise text selections with a local or cloud LLM", long_about = None)]
struct Cli {
    /// Use this config file instead of searching for recap.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the configured provider (ollama, openai, mock)
    #[arg(long, global = true)]
    provider: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise text given as an argument, a file, the editor, or stdin
    Add {
        /// Text to summarise
        text: Option<String>,
        /// Read the text from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Compose the text in $EDITOR
        #[arg(long, conflicts_with_all = ["text", "file"])]
        edit: bool,
        /// Tag stored with the summary
        #[arg(long)]
        source: Option<String>,
    },
    /// List all stored summaries
    List,
    /// Show one summary by id or list position
    Show {
        /// Record id, or its 1-based position in `list`
        key: String,
    },
    /// Remove every stored summary
    Clear {
        /// Reseed the welcome entries afterwards
        #[arg(long)]
        welcome: bool,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Export summaries; .json, .md or anything else for plain text
    Export {
        /// Target file
        path: PathBuf,
    },
    /// Check that the configured provider answers
    TestConnection,
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "recap", &mut std::io::stdout());
        return Ok(());
    }

    let source = ConfigSource::new(cli.config, cli.provider.as_deref().map(Provider::from));
    let config = source.load()?;

    let client = SummarizerClient::new(&config).context("failed to build HTTP client")?;
    let mut store = SummaryStore::open(config.storage.summaries_file(), client).await;
    let mut events = store.subscribe();

    match cli.command {
        Some(Commands::Add {
            text,
            file,
            edit,
            source,
        }) => {
            let text = read_input(text, file, edit)?;
            let source = source.unwrap_or_else(|| "manual".to_string());
            add(&mut store, &text, &source).await?;
        }
        Some(Commands::List) => {
            if store.is_empty() {
                println!("No stored summaries found.");
            } else {
                println!("Stored summaries ({}):\n", store.len());
                let now = chrono::Utc::now();
                for (i, record) in store.records().iter().enumerate() {
                    println!(
                        "{} {} ({})",
                        format!("{}.", i + 1).bold(),
                        record.id(),
                        record.description(now).dimmed()
                    );
                    println!("   {}\n", record.summary_text());
                }
            }
        }
        Some(Commands::Show { key }) => {
            let Some(record) = store.find(&key) else {
                bail!("no summary matches '{}'", key);
            };
            println!("{}\n", format!("Summary {}", record.id()).bold());
            println!("{}\n", record.summary_text());
            for (label, value) in record.details().into_iter().skip(1) {
                println!("{} {}", format!("{}:", label).cyan(), value);
            }
            println!("\n{}", "Original Text".bold());
            println!("{}", record.original_text());
        }
        Some(Commands::Clear { welcome, yes }) => {
            let confirmed = yes
                || dialoguer::Confirm::new()
                    .with_prompt(format!("Clear all {} summaries?", store.len()))
                    .default(false)
                    .interact()?;
            if confirmed {
                let mode = if welcome {
                    ClearMode::Welcome
                } else {
                    ClearMode::Empty
                };
                store.clear_all(mode).await;
                println!("🗑️  Summaries cleared");
            }
        }
        Some(Commands::Export { path }) => match store.export(&path).await? {
            ExportOutcome::Written { path, count, .. } => {
                println!("Exported {} summaries to {}", count, path.display())
            }
            ExportOutcome::NothingToExport => println!("No summaries to export"),
        },
        Some(Commands::TestConnection) => {
            let status = store.summarizer().test_connection().await;
            if status.success {
                println!("{}", status.message.green());
            } else {
                println!("{}", status.message.red());
                std::process::exit(1);
            }
        }
        Some(Commands::Completions { .. }) => unreachable!("handled before loading config"),
        None => {
            if config.summarizer.auto_summarize && !atty::is(atty::Stream::Stdin) {
                // Piped input with auto_summarize on: summarise instead of browsing
                let text = read_input(None, None, false)?;
                add(&mut store, &text, "stdin").await?;
            } else {
                ui::run(&mut store, &source).await?;
            }
        }
    }

    report_store_warnings(&mut events);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Collect the text to summarise and reject blank input
fn read_input(text: Option<String>, file: Option<PathBuf>, edit: bool) -> anyhow::Result<String> {
    let input = if let Some(text) = text {
        text
    } else if let Some(file) = file {
        std::fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?
    } else if edit {
        edit::edit("")?
    } else if !atty::is(atty::Stream::Stdin) {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        bail!("no text given; pass it as an argument, with --file, --edit, or on stdin");
    };

    if input.trim().is_empty() {
        bail!("Please select some text first");
    }
    Ok(input)
}

/// Summarise and store `text`, giving up if the user presses Ctrl-C
async fn add(store: &mut SummaryStore<SummarizerClient>, text: &str, source: &str) -> anyhow::Result<()> {
    println!("{}\n", progress_message(text));

    let record = tokio::select! {
        result = store.add(text, Some(source)) => result?,
        _ = tokio::signal::ctrl_c() => bail!("cancelled"),
    };

    println!("{}", "✅ Text summarised".green());
    println!("{}\n", record.summary_text());
    println!(
        "{}",
        format!("{} · {} words · {}", record.id(), record.word_count(), record.source_label()).dimmed()
    );
    Ok(())
}

fn progress_message(text: &str) -> String {
    format!("Summarising {} characters...", text.chars().count())
}

/// Surface save failures the store reported while we worked
fn report_store_warnings(events: &mut Receiver<StoreEvent>) {
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::PersistFailed { message } = event {
            eprintln!("{} {}", "Warning:".yellow().bold(), message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_counts_characters_not_bytes() {
        assert_eq!(progress_message("abc"), "Summarising 3 characters...");
        assert_eq!(progress_message("café ümlaut 日本"), "Summarising 14 characters...");
    }
}
