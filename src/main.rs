use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragbook::docs::types::Upload;
use ragbook::llm::build_generator;
use ragbook::pipeline::INSUFFICIENT_EVIDENCE_MESSAGE;
use ragbook::{Config, QueryOutcome, QueryRequest, RagPipeline};

/// Ask questions about a set of documents, answered only from their content.
#[derive(Debug, Parser)]
#[command(name = "ragbook", version)]
struct Cli {
    /// Document to upload into the session (repeatable)
    #[arg(short, long = "file", required = true)]
    files: Vec<PathBuf>,

    /// Question to ask (repeatable). Reads one question per stdin line when omitted.
    #[arg(short, long = "question")]
    questions: Vec<String>,

    /// Chunks to retrieve per question
    #[arg(short, long)]
    k: Option<usize>,

    /// Character budget for the packed context
    #[arg(long)]
    max_context: Option<usize>,

    /// Bound the conversation history in each prompt to this many characters
    #[arg(long)]
    history_chars: Option<usize>,

    /// Answer each question on its own, without conversation history
    #[arg(long)]
    stateless: bool,

    /// Print a summary in this style (e.g. "executive") before answering
    #[arg(long)]
    summarize: Option<String>,

    /// Emit citations and summaries as JSON
    #[arg(long)]
    json: bool,
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

async fn read_uploads(paths: &[PathBuf]) -> Result<Vec<Upload>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        uploads.push(Upload {
            filename,
            mime: guess_mime(path).to_string(),
            bytes,
        });
    }
    Ok(uploads)
}

async fn answer(pipeline: &RagPipeline, session_id: &str, cli: &Cli, question: &str) -> Result<()> {
    let request = QueryRequest {
        message: question.to_string(),
        k: cli.k,
        max_context_chars: cli.max_context,
        history_chars: cli.history_chars,
        remember: !cli.stateless,
    };

    let mut stdout = tokio::io::stdout();
    match pipeline.query(session_id, request).await? {
        QueryOutcome::InsufficientEvidence => {
            stdout
                .write_all(format!("{}\n", INSUFFICIENT_EVIDENCE_MESSAGE).as_bytes())
                .await?;
        }
        QueryOutcome::Answer(mut answer) => {
            if cli.json {
                let meta = serde_json::to_string(&answer.citations)?;
                stdout.write_all(format!("{}\n", meta).as_bytes()).await?;
            }
            while let Some(token) = answer.tokens.next().await {
                stdout.write_all(token.as_bytes()).await?;
                stdout.flush().await?;
            }
            if !cli.json && !answer.citations.is_empty() {
                let mut sources = String::from("\nSources:\n");
                for (i, c) in answer.citations.iter().enumerate() {
                    sources.push_str(&format!("  [{}] {} (chunk {})\n", i + 1, c.filename, c.chunk));
                }
                stdout.write_all(sources.as_bytes()).await?;
            }
        }
    }
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so streamed answers on stdout stay clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!(
        ttl_secs = config.session_ttl.as_secs(),
        max_upload_mb = config.max_upload_mb,
        embed_dim = config.embed_dim,
        "Configuration loaded"
    );

    let generator = build_generator(&config)?;
    let pipeline = RagPipeline::new(config, generator);

    let session_id = pipeline.open_session().await;
    let uploads = read_uploads(&cli.files).await?;
    let report = pipeline.upload(&session_id, uploads).await?;
    info!(
        documents = report.added.len(),
        total_chunks = report.total_chunks,
        "Documents indexed"
    );

    if let Some(mode) = &cli.summarize {
        let summary = pipeline.summarize(&session_id, mode).await?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!("{}\n", summary.summary);
        }
    }

    if cli.questions.is_empty() {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            answer(&pipeline, &session_id, &cli, question).await?;
        }
    } else {
        for question in &cli.questions {
            answer(&pipeline, &session_id, &cli, question).await?;
        }
    }

    let summary = pipeline.conversation_summary(&session_id).await;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    info!(
        messages = summary.total_messages,
        duration_secs = summary.session_duration,
        "Session finished"
    );
    pipeline.close_session(&session_id).await;
    pipeline.purge_expired().await;

    Ok(())
}
