//! Command-line shell around the answering pipeline.
//!
//! ```text
//! kcc-chat ask "When will it rain in Maharashtra?"
//! kcc-chat repl
//! kcc-chat ingest kcc_dump.jsonl
//! ```

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::application::{AnswerResponse, AskRequest, IngestDocumentRequest};
use crate::{build_environment, build_environment_at, AppHandles};

pub const EXAMPLE_QUERIES: [&str; 2] = [
    "What issues do sugarcane farmers in Maharashtra commonly face?",
    "When will it rain in Maharashtra?",
];

#[derive(Debug, Parser)]
#[command(name = "kcc-chat", version, about = "Ask farming questions")]
pub struct Cli {
    /// Data directory holding config.json and the knowledge base
    #[arg(long, global = true, env = "KCC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer a single question
    Ask {
        question: String,
        /// Maximum number of knowledge base documents to use
        #[arg(long)]
        top_k: Option<usize>,
        /// Print the answer envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive question loop (default)
    Repl,
    /// Load documents into the knowledge base (.jsonl or plain text)
    Ingest { file: PathBuf },
    /// Report knowledge base status
    Health,
    /// Print the effective configuration
    Config {
        /// Also write it to config.json
        #[arg(long)]
        write: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let handles = match cli.data_dir {
        Some(dir) => build_environment_at(dir),
        None => build_environment(),
    }
    .context("failed to bootstrap kcc-chat")?;

    match cli.command.unwrap_or(Command::Repl) {
        Command::Ask {
            question,
            top_k,
            json,
        } => ask(&handles, &question, top_k, json),
        Command::Repl => repl(&handles),
        Command::Ingest { file } => ingest(&handles, &file),
        Command::Health => health(&handles),
        Command::Config { write } => show_config(&handles, write),
    }
}

fn ask(handles: &AppHandles, question: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let question = question.trim();
    if question.is_empty() {
        bail!("question cannot be empty");
    }

    let mut request = AskRequest::new(question);
    request.top_k = top_k;
    let response = handles
        .answers
        .ask(request)
        .map_err(|err| anyhow!(err))
        .context("failed to answer question")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_answer(&mut io::stdout().lock(), &response)?;
    }
    Ok(())
}

fn repl(handles: &AppHandles) -> Result<()> {
    let stdin = io::stdin();
    let mut out = io::stdout().lock();

    writeln!(out, "KCC Chatbot: Ask Farming Questions")?;
    writeln!(out, "Example queries:")?;
    for example in EXAMPLE_QUERIES {
        writeln!(out, "- {example}")?;
    }

    loop {
        write!(out, "\nEnter your farming question: ")?;
        out.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match handles.answers.ask(AskRequest::new(question)) {
            Ok(response) => print_answer(&mut out, &response)?,
            // Keep the session alive when a provider is down.
            Err(err) => writeln!(out, "Could not answer: {err}")?,
        }
    }

    Ok(())
}

fn print_answer(out: &mut impl Write, response: &AnswerResponse) -> io::Result<()> {
    writeln!(out, "- {}", response.source.label())?;
    writeln!(out, "### Answer:")?;
    writeln!(out, "{}", response.answer)
}

fn ingest(handles: &AppHandles, file: &Path) -> Result<()> {
    let requests = read_ingest_file(file)?;
    let total = requests.len();
    let report = handles
        .knowledge
        .ingest_batch(requests)
        .map_err(|err| anyhow!(err))
        .context("ingestion aborted")?;

    info!(
        target: "kcc::cli",
        file = %file.display(),
        total,
        ingested = report.ingested,
        skipped = report.skipped.len(),
        "ingestion finished"
    );
    println!(
        "ingested {} of {} documents ({} skipped)",
        report.ingested,
        total,
        report.skipped.len()
    );
    Ok(())
}

/// `.jsonl`/`.ndjson` files carry one `{"text": ..., "source": ...}` object per
/// line; anything else is read as one document per non-empty line.
pub fn read_ingest_file(path: &Path) -> Result<Vec<IngestDocumentRequest>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_json_lines = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jsonl" | "ndjson"))
        .unwrap_or(false);

    let mut requests = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_json_lines {
            let request: IngestDocumentRequest = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid document", path.display(), idx + 1))?;
            requests.push(request);
        } else {
            requests.push(IngestDocumentRequest {
                text: line.to_string(),
                source: Some(path.display().to_string()),
            });
        }
    }

    Ok(requests)
}

fn health(handles: &AppHandles) -> Result<()> {
    let status = handles
        .knowledge
        .health()
        .map_err(|err| anyhow!(err))
        .context("health check failed")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn show_config(handles: &AppHandles, write: bool) -> Result<()> {
    if write {
        handles
            .config
            .save()
            .with_context(|| format!("failed to write {}", handles.config.path().display()))?;
        info!(target: "kcc::cli", path = %handles.config.path().display(), "config written");
    }
    let config = handles.config.current();
    println!("{}", serde_json::to_string_pretty(&config)?);
    if let Some(note) = config.embedding.threshold_note() {
        eprintln!("note: {note}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AnswerSource;
    use tempfile::tempdir;

    #[test]
    fn reads_json_lines_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kcc.jsonl");
        fs::write(
            &path,
            "{\"text\": \"Use neem oil for aphids\", \"source\": \"KCC Pune\"}\n\n{\"text\": \"Sow soybean after 100mm rain\"}\n",
        )
        .unwrap();

        let docs = read_ingest_file(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source.as_deref(), Some("KCC Pune"));
        assert!(docs[1].source.is_none());
    }

    #[test]
    fn reads_plain_text_one_document_per_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, "first advisory\n   \nsecond advisory\n").unwrap();

        let docs = read_ingest_file(&path).unwrap();
        let texts: Vec<_> = docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, ["first advisory", "second advisory"]);
    }

    #[test]
    fn invalid_json_line_names_its_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"text\": \"ok\"}\nnot json\n").unwrap();

        let err = read_ingest_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("bad.jsonl:2"));
    }

    #[test]
    fn answer_output_shows_source_label() {
        let response = AnswerResponse {
            query: "q".into(),
            source: AnswerSource::WebSearch,
            context_items: 2,
            answer: "Rain is expected in June.".into(),
        };
        let mut buf = Vec::new();
        print_answer(&mut buf, &response).unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("- By Internet Search\n"));
        assert!(text.ends_with("Rain is expected in June.\n"));
    }

    #[test]
    fn cli_parses_ask_with_top_k() {
        let cli = Cli::try_parse_from(["kcc-chat", "ask", "paddy blast", "--top-k", "5"]).unwrap();
        match cli.command {
            Some(Command::Ask { question, top_k, json }) => {
                assert_eq!(question, "paddy blast");
                assert_eq!(top_k, Some(5));
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
