//! `ragdesk` command-line front end.
//!
//! A thin shell over [`ragdesk::session::Session`]: every subcommand maps onto one session
//! operation. Answers go to stdout; progress and logs go to stderr.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use ragdesk::{
    answer::{QueryError, RetrievalSettings},
    batch::{BatchMode, BatchRequest},
    config::{self, Config},
    logging,
    progress::StderrProgress,
    session::{NO_INDEX_NOTICE, Session, SessionStatus},
};
use time::{OffsetDateTime, macros::format_description};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "ragdesk",
    version,
    about = "Answer questions about your documents from retrieved passages"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest documents (PDF or UTF-8 text) into the index.
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Ask a single question.
    Ask {
        question: String,
        /// Number of passages to retrieve (1-10).
        #[arg(short, long)]
        k: Option<usize>,
        /// Minimum similarity score (0-1).
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Process every matching file in a directory.
    Batch {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        pattern: Option<String>,
        #[arg(long, value_enum, default_value_t = ModeArg::Ask)]
        mode: ModeArg,
    },
    /// Show whether an index is loaded.
    Status,
    /// Delete the index.
    Reset,
    /// Interactive question loop.
    Chat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Ask,
    Ingest,
}

impl From<ModeArg> for BatchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ask => BatchMode::Ask,
            ModeArg::Ingest => BatchMode::Ingest,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("invalid configuration")?;
    logging::init_tracing();
    let mut session = Session::from_config(config);

    match cli.command {
        Command::Ingest { files } => {
            let outcomes = session.ingest_paths(&files, &StderrProgress).await;
            let failed = outcomes.iter().filter(|outcome| !outcome.is_success()).count();
            for outcome in &outcomes {
                println!("{}", outcome.message());
            }
            if failed > 0 {
                bail!("{failed} of {} documents failed to ingest", outcomes.len());
            }
        }
        Command::Ask { question, k, threshold } => {
            let current = session.settings();
            let settings = RetrievalSettings::new(
                k.unwrap_or(current.k),
                threshold.unwrap_or(current.score_threshold),
            )?;
            match session.ask(&question, settings).await {
                Ok(answer) => println!("{}", answer.text),
                Err(QueryError::NoIndex) => bail!(NO_INDEX_NOTICE),
                Err(error) => return Err(error.into()),
            }
        }
        Command::Batch { dir, pattern, mode } => {
            let request = BatchRequest {
                dir: dir.unwrap_or_else(|| config.batch_dir.clone()),
                pattern: pattern.unwrap_or_else(|| config.batch_pattern.clone()),
                mode: mode.into(),
            };
            run_batch(&mut session, &request).await?;
        }
        Command::Status => print_status(&session),
        Command::Reset => {
            session.clear_all()?;
            println!("Index cleared.");
        }
        Command::Chat => chat(&mut session, config).await?,
    }
    Ok(())
}

async fn run_batch(session: &mut Session, request: &BatchRequest) -> Result<()> {
    println!("Case dir: {}", request.dir.display());
    let report = session.run_batch(request, &StderrProgress).await?;
    if report.outcomes.is_empty() {
        println!(
            "No files matching {} found, double check the folder {}",
            request.pattern,
            request.dir.display()
        );
    }
    println!("starting process at {}", display_time(report.started_at));
    println!("Finish process at {}", display_time(report.finished_at));
    println!(
        "Time difference: {:.2} seconds ({} written, {} ingested, {} skipped, {} failed)",
        report.elapsed.as_secs_f64(),
        report.written(),
        report.ingested(),
        report.skipped(),
        report.failed()
    );
    Ok(())
}

fn display_time(at: OffsetDateTime) -> String {
    at.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| at.to_string())
}

fn print_status(session: &Session) {
    match session.status() {
        SessionStatus::Ready {
            chunks,
            sources,
            location,
        } => {
            println!("Vector store is loaded successfully.");
            println!("  location: {}", location.display());
            println!("  chunks:   {chunks}");
            for source in sources {
                println!("  source:   {source}");
            }
        }
        SessionStatus::Uninitialized => println!("No vector store found."),
    }
}

const CHAT_HELP: &str = "\
commands:
  :ingest <file>...     ingest documents (clears the conversation)
  :k <1-10>             passages retrieved per question
  :threshold <0-1>      minimum similarity score
  :clear                clear the conversation
  :reset                delete the index and the conversation
  :status               show the index status
  :history              print the conversation
  :metrics              show session counters
  :batch [ask|ingest]   process the configured batch directory
  :quit                 leave
anything else is asked as a question";

async fn chat(session: &mut Session, config: &Config) -> Result<()> {
    println!("{CHAT_HELP}");
    for message in session.history() {
        println!("{}", message.text);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == ":quit" || line == ":q" {
            break;
        }
        if let Err(error) = handle_chat_line(session, config, line).await {
            eprintln!("error: {error:#}");
        }
    }
    Ok(())
}

async fn handle_chat_line(session: &mut Session, config: &Config, line: &str) -> Result<()> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some(":ingest") => {
            let files: Vec<PathBuf> = parts.map(PathBuf::from).collect();
            if files.is_empty() {
                bail!("usage: :ingest <file>...");
            }
            for outcome in session.ingest_paths(&files, &StderrProgress).await {
                println!("{}", outcome.message());
            }
        }
        Some(":k") => {
            let k: usize = parts.next().context("usage: :k <1-10>")?.parse()?;
            let settings = RetrievalSettings::new(k, session.settings().score_threshold)?;
            session.update_settings(settings);
            println!("k = {k}");
        }
        Some(":threshold") => {
            let threshold: f32 = parts.next().context("usage: :threshold <0-1>")?.parse()?;
            let settings = RetrievalSettings::new(session.settings().k, threshold)?;
            session.update_settings(settings);
            println!("threshold = {threshold}");
        }
        Some(":clear") => session.clear_chat(),
        Some(":reset") => {
            session.clear_all()?;
            println!("Index cleared.");
        }
        Some(":status") => print_status(session),
        Some(":history") => {
            for message in session.history() {
                let speaker = if message.is_user { "you" } else { "assistant" };
                println!("[{speaker}] {}", message.text);
            }
        }
        Some(":metrics") => {
            println!(
                "{}",
                serde_json::to_string_pretty(&session.metrics_snapshot())?
            );
        }
        Some(":batch") => {
            let mode = match parts.next() {
                None | Some("ask") => BatchMode::Ask,
                Some("ingest") => BatchMode::Ingest,
                Some(other) => bail!("unknown batch mode '{other}'"),
            };
            let request = BatchRequest {
                dir: config.batch_dir.clone(),
                pattern: config.batch_pattern.clone(),
                mode,
            };
            run_batch(session, &request).await?;
        }
        Some(command) if command.starts_with(':') => {
            bail!("unknown command '{command}'; try :quit or a question")
        }
        _ => {
            // Failed questions are recorded in the history; print whatever was appended last.
            let answered = session.ask_with_current_settings(line).await;
            match answered {
                Ok(answer) => println!("{}", answer.text),
                Err(QueryError::Validation(reason)) => bail!(reason),
                Err(_) => {
                    if let Some(reply) = session.history().last() {
                        println!("{}", reply.text);
                    }
                }
            }
        }
    }
    Ok(())
}
