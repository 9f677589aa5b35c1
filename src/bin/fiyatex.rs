//! CLI binary for fiyatex.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs each input through the cascade, and merges the
//! results into the master dataset.

use anyhow::{Context, Result};
use clap::Parser;
use fiyatex::{
    extract, ExtractionConfig, ExtractionGuide, ExtractionProgress, MasterStore, MergeMode,
    PageStatus, PriceStyle, ProgressHandle, QualityThresholds, Record, RetryPolicy, SourceInput,
    TokenCounts,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

/// Terminal progress: a spinner for stage messages, a bar once the fallback
/// starts reporting pages. Works when pages complete out of order.
struct CliProgress {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: u32) {
        if self.bar.length().unwrap_or(0) == total as u64 {
            return;
        }
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Fallback");
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgress for CliProgress {
    fn on_status(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn on_page_start(&self, page_num: u32, total_pages: u32) {
        self.activate_bar(total_pages);
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: u32, total_pages: u32, rows: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{rows:>4} rows")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: u32, total_pages: u32, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            let t: String = error.chars().take(79).collect();
            format!("{t}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
        ));
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract one spreadsheet into the master dataset
  fiyatex Bosch_Fiyat_Listesi_2024.xlsx

  # Extract several sources, superseding earlier imports of the same brand/year/file
  fiyatex --mode update *.pdf *.xlsx

  # Force the vision fallback regardless of the text layer
  fiyatex --force-llm scanned_catalogue.pdf

  # Use a specific model and a per-file prompt guide
  fiyatex --model gpt-4o --provider openai --guide guide.csv liste.pdf

  # Extract from a URL
  fiyatex https://example.com/fiyat_listesi_2024.pdf

  # Keep raw model responses for inspection
  fiyatex --debug-dir ./debug liste.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Extract:         fiyatex liste.pdf

  The vision provider is only contacted when a document actually escalates
  past the quality gate; spreadsheets never need an API key.
"#;

/// Extract product/price records from price lists into a master dataset.
#[derive(Parser, Debug)]
#[command(
    name = "fiyatex",
    version,
    about = "Extract product/price records from price lists (XLSX/PDF) into a master dataset",
    long_about = "Extract structured product/price records from vendor price lists. Spreadsheets \
are read directly; PDFs run through a cascade of text-layer parsing, an optional OCR pass, and \
a Vision LLM fallback. Results are merged into a CSV master snapshot with a SQLite mirror.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Price list files or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Master CSV snapshot path.
    #[arg(long, env = "FIYATEX_MASTER_CSV", default_value = "master_dataset.csv")]
    master_csv: PathBuf,

    /// SQLite mirror path.
    #[arg(long, env = "FIYATEX_MASTER_DB", default_value = "master_dataset.db")]
    master_db: PathBuf,

    /// Merge mode: new appends, update supersedes by brand/year/source file.
    #[arg(long, env = "FIYATEX_MODE", value_enum, default_value = "update")]
    mode: MergeModeArg,

    /// Print extracted records as JSON instead of merging into the master.
    #[arg(long, env = "FIYATEX_DRY_RUN")]
    dry_run: bool,

    /// Skip the cheap stages and send every page to the vision model.
    #[arg(long, env = "FIYATEX_FORCE_LLM")]
    force_llm: bool,

    /// LLM model ID (e.g. gpt-4o, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// CSV or JSON file with per-source prompt overrides.
    #[arg(long, env = "FIYATEX_GUIDE")]
    guide: Option<PathBuf>,

    /// Directory for raw model response dumps.
    #[arg(long, env = "FIYATEX_DEBUG_DIR")]
    debug_dir: Option<PathBuf>,

    /// Rendering DPI for the vision fallback (72–400).
    #[arg(long, env = "FIYATEX_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Concurrent vision calls per document.
    #[arg(short, long, env = "FIYATEX_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Quality gate: minimum rows for a cheap result to stand.
    #[arg(long, env = "FIYATEX_MIN_ROWS", default_value_t = 500)]
    min_rows: usize,

    /// Quality gate: minimum fraction of rows with a product code.
    #[arg(long, env = "FIYATEX_MIN_CODE_RATIO", default_value_t = 0.70)]
    min_code_ratio: f64,

    /// Currency assumed when none is detected.
    #[arg(long, env = "FIYATEX_CURRENCY", default_value = "TRY")]
    currency: String,

    /// Price separator convention: eu (1.234,56) or en (1,234.56).
    #[arg(long, env = "FIYATEX_PRICE_STYLE", value_enum, default_value = "eu")]
    price_style: PriceStyleArg,

    /// Max LLM output tokens per page.
    #[arg(long, env = "FIYATEX_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "FIYATEX_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on transient LLM failure.
    #[arg(long, env = "FIYATEX_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "FIYATEX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FIYATEX_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "FIYATEX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FIYATEX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "FIYATEX_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MergeModeArg {
    New,
    Update,
}

impl From<MergeModeArg> for MergeMode {
    fn from(v: MergeModeArg) -> Self {
        match v {
            MergeModeArg::New => MergeMode::New,
            MergeModeArg::Update => MergeMode::Update,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PriceStyleArg {
    Eu,
    En,
}

impl From<PriceStyleArg> for PriceStyle {
    fn from(v: PriceStyleArg) -> Self {
        match v {
            PriceStyleArg::Eu => PriceStyle::Eu,
            PriceStyleArg::En => PriceStyle::En,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Suppress INFO-level library logs when the progress bar is active; the
    // bar is the feedback channel then.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.dry_run;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress = if show_progress {
        Some(CliProgress::new())
    } else {
        None
    };

    let config = build_config(&cli, progress.clone().map(|p| p as ProgressHandle))?;

    let mut all_records: Vec<Record> = Vec::new();
    let mut tokens = TokenCounts::default();
    let mut failed_sources = 0usize;

    for input in &cli.inputs {
        let source = SourceInput::from_str_like(input);
        match extract(&source, &config).await {
            Ok(output) => {
                if let Some(t) = output.token_counts {
                    tokens.merge(t);
                }
                report_source(&cli, input, &output.records, &output.page_summary, progress.as_deref());
                all_records.extend(output.records);
            }
            Err(e) => {
                failed_sources += 1;
                if let Some(ref p) = progress {
                    p.bar.println(format!("{} {input}: {e}", red("✗")));
                } else {
                    eprintln!("{} {input}: {e}", red("✗"));
                }
            }
        }
    }

    if let Some(ref p) = progress {
        p.finish();
    }

    if cli.dry_run {
        println!(
            "{}",
            serde_json::to_string_pretty(&all_records).context("Failed to serialise records")?
        );
    } else {
        let mut store = MasterStore::new(&cli.master_csv, &cli.master_db);
        if let Some(ref dir) = cli.debug_dir {
            store = store.with_debug_dir(dir);
        }
        let report = store
            .merge(&all_records, cli.mode.into())
            .context("Master merge failed")?;

        if !cli.quiet {
            eprintln!(
                "{} {} records merged  ({} superseded)  →  {}",
                green("✔"),
                bold(&report.added.to_string()),
                report.removed,
                bold(&cli.master_csv.display().to_string()),
            );
            eprintln!("   {} rows in master", bold(&report.total.to_string()));
            if tokens != TokenCounts::default() {
                eprintln!(
                    "   {} tokens in  /  {} tokens out",
                    dim(&tokens.input_tokens.to_string()),
                    dim(&tokens.output_tokens.to_string()),
                );
            }
        }
    }

    if failed_sources > 0 {
        anyhow::bail!("{failed_sources} source(s) failed");
    }
    Ok(())
}

/// Per-source summary line plus its page ledger anomalies.
fn report_source(
    cli: &Cli,
    input: &str,
    records: &[Record],
    pages: &[fiyatex::PageOutcome],
    progress: Option<&CliProgress>,
) {
    if cli.quiet {
        return;
    }
    let line = format!(
        "{} {}  {}",
        cyan("◆"),
        bold(input),
        dim(&format!("{} records", records.len())),
    );
    match progress {
        Some(p) => p.bar.println(line),
        None => eprintln!("{line}"),
    }

    for outcome in pages {
        if matches!(outcome.status, PageStatus::Error | PageStatus::GaveUp) {
            let note = outcome.note.as_deref().unwrap_or("");
            let line = format!(
                "    {} page {}: {} {}",
                red("!"),
                outcome.page_number,
                outcome.status,
                dim(note),
            );
            match progress {
                Some(p) => p.bar.println(line),
                None => eprintln!("{line}"),
            }
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressHandle>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .retry(RetryPolicy {
            max_retries: cli.max_retries,
            ..RetryPolicy::default()
        })
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .quality(QualityThresholds {
            min_rows: cli.min_rows,
            min_code_ratio: cli.min_code_ratio,
        })
        .default_currency(cli.currency.clone())
        .price_style(cli.price_style.into())
        .force_fallback(cli.force_llm);

    if let Some(ref path) = cli.guide {
        let guide = ExtractionGuide::load(path)
            .with_context(|| format!("Failed to read guide from {path:?}"))?;
        builder = builder.guide(guide);
    }
    if let Some(ref dir) = cli.debug_dir {
        builder = builder.debug_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    Ok(config)
}
