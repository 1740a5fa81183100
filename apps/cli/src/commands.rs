//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::info;

use paperpage_authors::AuthorNameDetector;
use paperpage_core::{
    BatchOrchestrator, BatchProgress, FileSet, GenerationJob, GenerationPipeline,
    GenerationRequest, JobState, OpenRouterGenerator, load_rows, validate_rows,
};
use paperpage_shared::{
    AppConfig, AuxFields, ExtractorLimits, GeneratorSettings, ResolverConfig, SourceDescriptor,
    SourceKind, init_config, load_config, resolve_database_path,
};
use paperpage_sources::{PdfTextExtractor, SourceResolver, TextExtractor};
use paperpage_storage::Storage;

use crate::progress::CliBatchProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// paperpage: turn papers, repositories and videos into project pages.
#[derive(Parser)]
#[command(
    name = "paperpage",
    version,
    about = "Generate structured project-page records from PDFs, repositories and videos.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate one project record.
    Generate {
        /// Source type: pdf, github or youtube.
        #[arg(long = "type")]
        kind: SourceKind,

        /// URL, or a file name under the uploads root.
        #[arg(long)]
        source: String,

        /// Project id; re-using an id overwrites the stored record.
        #[arg(long)]
        id: String,

        /// Manual authors (`Name @ Affiliation; ...`).
        #[arg(long)]
        authors: Option<String>,

        #[arg(long)]
        institution: Option<String>,

        #[arg(long)]
        venue: Option<String>,

        #[arg(long)]
        year: Option<String>,
    },

    /// Validate and run a batch of rows from a .csv or .json file.
    Batch {
        /// Rows file.
        rows: PathBuf,

        /// Directory holding the PDFs named by `pdfFileName`.
        #[arg(long)]
        files: Option<PathBuf>,

        /// Concurrent jobs (clamped to 1..=3). Defaults to the config value.
        #[arg(long)]
        workers: Option<usize>,

        /// Extra rounds re-running only failed jobs.
        #[arg(long, default_value = "0")]
        retry_rounds: usize,
    },

    /// Print the author names detected in a local PDF.
    Authors {
        /// Path to the PDF.
        pdf: PathBuf,
    },

    /// List stored project records.
    List,

    /// Print one stored project record as JSON.
    Show {
        /// Project id.
        id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "paperpage=info",
        1 => "paperpage=debug",
        _ => "paperpage=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate {
            kind,
            source,
            id,
            authors,
            institution,
            venue,
            year,
        } => {
            let aux = AuxFields {
                authors,
                institution,
                venue,
                year,
            };
            let request =
                GenerationRequest::new(id, SourceDescriptor::new(kind, source)).with_aux(aux);
            cmd_generate(request).await
        }
        Command::Batch {
            rows,
            files,
            workers,
            retry_rounds,
        } => cmd_batch(&rows, files.as_deref(), workers, retry_rounds).await,
        Command::Authors { pdf } => cmd_authors(&pdf).await,
        Command::List => cmd_list().await,
        Command::Show { id } => cmd_show(&id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Build a pipeline over the configured store, resolver and generator.
/// `uploads_root` overrides the configured root for local locators.
async fn build_pipeline(
    config: &AppConfig,
    uploads_root: Option<&Path>,
) -> Result<GenerationPipeline> {
    let settings = GeneratorSettings::from_config(config)?;
    let generator = OpenRouterGenerator::new(&settings)?;

    let mut resolver_config = ResolverConfig::from(config);
    if let Some(root) = uploads_root {
        resolver_config.uploads_root = root.to_path_buf();
    }
    let resolver = SourceResolver::new(resolver_config)?;
    let extractor = PdfTextExtractor::new(ExtractorLimits::from(config));

    let db_path = resolve_database_path(config)?;
    let storage = Storage::open(&db_path).await?;
    info!(db = %db_path.display(), model = %settings.model, "pipeline ready");

    Ok(GenerationPipeline::new(
        Arc::new(resolver),
        Arc::new(extractor),
        Arc::new(generator),
        Arc::new(storage),
    ))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(request: GenerationRequest) -> Result<()> {
    let config = load_config()?;
    let pipeline = build_pipeline(&config, None).await?;

    info!(id = %request.id, kind = %request.source.kind, "generating project");
    let outcome = pipeline.run(&request).await?;

    println!();
    println!("  Project generated!");
    println!("  ID:      {}", outcome.id);
    println!("  Title:   {}", outcome.title);
    println!(
        "  Authors: {}",
        outcome
            .authors
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if outcome.recovered_from_malformed {
        println!("  Note:    generator reply was malformed; a minimal record was stored");
    }
    if outcome.cache_hit {
        println!("  Cache:   reused a cached generator reply");
    }
    println!("  Time:    {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_batch(
    rows_path: &Path,
    files_dir: Option<&Path>,
    workers: Option<usize>,
    retry_rounds: usize,
) -> Result<()> {
    let config = load_config()?;

    let rows = load_rows(rows_path)?;
    let files = match files_dir {
        Some(dir) => FileSet::from_dir(dir)?,
        None => FileSet::empty(),
    };
    let plan = validate_rows(&rows, &files);

    if !plan.errors.is_empty() {
        println!("  Rejected rows:");
        for error in &plan.errors {
            println!(
                "    row {} ({}): {}",
                error.row,
                error.project_id.as_deref().unwrap_or("-"),
                error.message
            );
        }
        println!();
    }
    if plan.jobs.is_empty() {
        return Err(eyre!("no valid rows to run in {}", rows_path.display()));
    }

    let pipeline = build_pipeline(&config, files_dir).await?;
    let progress = Arc::new(CliBatchProgress::new(plan.jobs.len()));
    let orchestrator = BatchOrchestrator::new(
        plan.jobs,
        Arc::new(pipeline),
        workers.unwrap_or(config.defaults.workers),
    )?
    .with_progress(Arc::clone(&progress) as Arc<dyn BatchProgress>);

    info!(
        batch_id = %orchestrator.batch_id(),
        workers = orchestrator.workers(),
        "running batch"
    );

    let mut summary = orchestrator.run_all().await;
    for round in 1..=retry_rounds {
        if summary.failed == 0 {
            break;
        }
        info!(round, failed = summary.failed, "retrying failed jobs");
        progress.restart(summary.failed);
        summary = orchestrator.retry_failed().await;
    }

    print_jobs(&orchestrator.snapshot().await);
    println!(
        "  Total: {}  Success: {}  Failed: {}  Rejected rows: {}  ({:.0}% complete)",
        summary.total,
        summary.success,
        summary.failed,
        plan.errors.len(),
        summary.percent_complete
    );
    println!();

    if summary.failed > 0 {
        return Err(eyre!("{} job(s) failed", summary.failed));
    }
    Ok(())
}

fn print_jobs(jobs: &[GenerationJob]) {
    let width = jobs.iter().map(|j| j.id.len()).max().unwrap_or(2).max(2);
    println!();
    println!("  {:<width$}  {:<8}  DETAIL", "ID", "STATE");
    for job in jobs {
        let detail = match job.state {
            JobState::Success => job.result_title.as_deref().unwrap_or(""),
            _ => job.message.as_deref().unwrap_or(""),
        };
        println!("  {:<width$}  {:<8}  {detail}", job.id, job.state.as_str());
    }
    println!();
}

async fn cmd_authors(pdf: &Path) -> Result<()> {
    let config = load_config()?;
    let bytes = tokio::fs::read(pdf)
        .await
        .map_err(|e| eyre!("cannot read {}: {e}", pdf.display()))?;

    let extractor = PdfTextExtractor::new(ExtractorLimits::from(&config));
    let text = extractor.extract(&bytes).await?;

    let detector = AuthorNameDetector::default();
    let set = detector.candidates(&text);
    let names = detector.select(&set);

    if names.is_empty() {
        println!("No author names detected in {}.", pdf.display());
        return Ok(());
    }
    for name in &names {
        println!("{name}");
    }
    info!(candidates = set.candidates.len(), authors = names.len(), "author detection complete");
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Option<Storage>> {
    let db_path = resolve_database_path(config)?;
    if !db_path.exists() {
        return Ok(None);
    }
    Ok(Some(Storage::open_readonly(&db_path).await?))
}

async fn cmd_list() -> Result<()> {
    let config = load_config()?;
    let Some(storage) = open_store(&config).await? else {
        println!("No projects stored yet.");
        return Ok(());
    };

    let projects = storage.list_projects().await?;
    if projects.is_empty() {
        println!("No projects stored yet.");
        return Ok(());
    }
    for project in projects {
        println!(
            "{}  [{}]  {}  (updated {})",
            project.id, project.source_kind, project.title, project.updated_at
        );
    }
    Ok(())
}

async fn cmd_show(id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = open_store(&config)
        .await?
        .ok_or_else(|| eyre!("no projects stored yet"))?;

    let record = storage
        .get_project(id)
        .await?
        .ok_or_else(|| eyre!("project '{id}' not found"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
