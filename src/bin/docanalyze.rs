//! CLI binary for edgequake-docanalyze.
//!
//! `docanalyze serve` runs the HTTP service; `docanalyze analyze` runs the
//! same pipeline over local files or URLs and prints the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docanalyze::server::{self, DEFAULT_BODY_LIMIT};
use edgequake_docanalyze::{
    load_input, AnalysisConfig, AnalysisConfigBuilder, AnalysisProgressCallback, Analyzer,
    FileOutcome, ProgressCallback, UploadedFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished file. Files finish out
/// of order in independent mode, so start times are keyed by filename.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>2}/{len} files  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Analyzing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, filename: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(filename))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analyzing {total_files} files…"))
        ));
    }

    fn on_file_start(&self, filename: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(filename.to_string(), Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_file_complete(&self, filename: &str, document_type: &str) {
        let secs = self.elapsed_secs(filename);
        self.bar.println(format!(
            "  {} {:<32}  {:<24}  {}",
            green("✓"),
            filename,
            dim(document_type),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, filename: &str, error: &str) {
        let secs = self.elapsed_secs(filename);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            red("✗"),
            filename,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} files analyzed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files analyzed  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start the HTTP service on port 8000
  docanalyze serve --port 8000

  # Analyze one invoice
  docanalyze analyze invoice.pdf

  # Several files, independent results as JSON
  docanalyze analyze --json q1.xlsx q2.xlsx contract.docx

  # One cross-document report
  docanalyze analyze --consolidated balance.pdf pnl.pdf notes.csv

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (required for the openai provider)
  OPENAI_MODEL            Model ID (default: gpt-4o)
  EDGEQUAKE_LLM_PROVIDER  Provider name (openai, anthropic, gemini, ollama, …)
  RUST_LOG                Log filter, e.g. edgequake_docanalyze=debug

  Variables are also read from a .env file in the working directory.
"#;

/// Classify and analyse business documents with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docanalyze",
    version,
    about = "Classify and analyse business documents with an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    llm: LlmArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCANALYZE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCANALYZE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        #[arg(long, env = "DOCANALYZE_HOST", default_value = "0.0.0.0")]
        host: String,

        #[arg(long, env = "DOCANALYZE_PORT", default_value_t = 8000)]
        port: u16,

        /// Request body limit in MiB.
        #[arg(long, env = "DOCANALYZE_MAX_UPLOAD_MB")]
        max_upload_mb: Option<usize>,
    },

    /// Analyse local files or URLs.
    Analyze {
        /// Local file paths or HTTP/HTTPS URLs.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// One cross-document analysis instead of per-file results.
        #[arg(long)]
        consolidated: bool,

        /// Print the raw JSON result.
        #[arg(long, env = "DOCANALYZE_JSON")]
        json: bool,

        /// Disable the progress bar.
        #[arg(long, env = "DOCANALYZE_NO_PROGRESS")]
        no_progress: bool,

        /// HTTP download timeout in seconds.
        #[arg(long, env = "DOCANALYZE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
        download_timeout: u64,
    },
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// LLM model ID. Overrides OPENAI_MODEL.
    #[arg(long, global = true)]
    model: Option<String>,

    /// LLM provider. Overrides EDGEQUAKE_LLM_PROVIDER.
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Attempts per LLM call before the fallback value is used.
    #[arg(long, global = true, env = "DOCANALYZE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Do not OCR image uploads.
    #[arg(long, global = true)]
    no_ocr: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs in interactive analyze runs.
    let show_progress = match &cli.command {
        Command::Analyze {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        Command::Serve { .. } => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli.llm, progress)?;
    let analyzer = Analyzer::new(config).context("Failed to initialise the LLM provider")?;

    match cli.command {
        Command::Serve {
            host,
            port,
            max_upload_mb,
        } => {
            let limit = max_upload_mb
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(DEFAULT_BODY_LIMIT);
            server::serve(analyzer, &host, port, limit)
                .await
                .context("Server failed")?;
        }
        Command::Analyze {
            inputs,
            consolidated,
            json,
            download_timeout,
            ..
        } => {
            let mut files = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let file = load_input(input, download_timeout)
                    .await
                    .with_context(|| format!("Failed to load '{input}'"))?;
                files.push(file);
            }
            run_analyze(&analyzer, files, consolidated, json, cli.quiet).await?;
        }
    }

    Ok(())
}

/// Map CLI args and the environment to `AnalysisConfig`.
fn build_config(args: &LlmArgs, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfigBuilder::from_config(AnalysisConfig::from_env())
        .max_retries(args.max_retries)
        .ocr_images(!args.no_ocr);
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

async fn run_analyze(
    analyzer: &Analyzer,
    files: Vec<UploadedFile>,
    consolidated: bool,
    json: bool,
    quiet: bool,
) -> Result<()> {
    if consolidated {
        let outcome = analyzer
            .analyze_consolidated(files)
            .await
            .context("Consolidated analysis failed")?;
        if json {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            return Ok(());
        }
        for info in &outcome.file_info {
            println!("{}  {}", bold(&info.filename), dim(info.document_type.as_str()));
        }
        println!();
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome.consolidated_analysis)?
        );
        if !quiet && outcome.failed_files > 0 {
            eprintln!(
                "{} {} of {} files could not be processed",
                cyan("⚠"),
                outcome.failed_files,
                outcome.total_files
            );
        }
        return Ok(());
    }

    let batch = analyzer.analyze_multiple(files).await.context("Analysis failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }
    for outcome in &batch.results {
        match outcome {
            FileOutcome::Success(analyzed) => {
                println!(
                    "{} {}  {}",
                    green("✓"),
                    bold(&analyzed.filename),
                    dim(analyzed.document_type.as_str())
                );
                println!("{}", serde_json::to_string_pretty(&analyzed.analysis)?);
                println!();
            }
            FileOutcome::Failed { filename, error } => {
                println!("{} {}  {}", red("✗"), bold(filename), red(error));
            }
        }
    }
    if !quiet {
        eprintln!(
            "Analyzed {}/{} files",
            batch.successful, batch.total_files
        );
    }
    Ok(())
}
