//! Command-line front end for sonde.
//!
//! Argument parsing and output formatting only; the work happens in
//! `sonde-core`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sonde_core::config::SondeConfig;
use sonde_core::indexer::filesystem::{extension_of, primary_language};
use sonde_core::{
    read_content, AnalyzeRepositoryHandler, ExtractorRegistry, FileDiscovery, JobSpec, JobStatus,
    Orchestrator, RepositorySource, SqliteStore, WorkspaceMaterializer, ANALYZE_REPOSITORY,
};

/// Sonde: structural analysis of source repositories.
#[derive(Parser, Debug)]
#[command(name = "sonde")]
#[command(author, version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "SONDE_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a repository and store its files, facts and edges.
    Analyze(AnalyzeArgs),

    /// List the files discovery would keep, with aggregate stats.
    Discover {
        /// Directory to walk.
        path: PathBuf,

        /// Largest file kept, in bytes.
        #[arg(long, env = "SONDE_MAX_FILE_SIZE")]
        max_file_size: Option<u64>,
    },

    /// Print the structural facts of a single file.
    Extract {
        /// Source file to extract.
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Local directory to analyze in place.
    #[arg(conflicts_with_all = ["git", "archive"], required_unless_present_any = ["git", "archive"])]
    path: Option<PathBuf>,

    /// Clone this remote instead.
    #[arg(long, value_name = "URL", conflicts_with = "archive")]
    git: Option<String>,

    /// Branch, tag or commit to check out after cloning.
    #[arg(long = "ref", value_name = "REF", requires = "git")]
    reference: Option<String>,

    /// Extract this zip archive instead.
    #[arg(long, value_name = "FILE")]
    archive: Option<PathBuf>,

    /// Repository id to record results under (random when omitted).
    #[arg(long)]
    id: Option<String>,

    /// SQLite database path.
    #[arg(long, env = "SONDE_DB", default_value = "sonde.db")]
    db: PathBuf,

    /// Jobs run at once.
    #[arg(long, env = "SONDE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Files read and inserted per storage call.
    #[arg(long, env = "SONDE_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Directory for clones and extracted archives.
    #[arg(long, env = "SONDE_WORKSPACE_ROOT")]
    workspace: Option<PathBuf>,
}

impl AnalyzeArgs {
    fn source(&self) -> anyhow::Result<RepositorySource> {
        match (&self.path, &self.git, &self.archive) {
            (_, Some(url), _) => Ok(RepositorySource::Git {
                url: url.clone(),
                reference: self.reference.clone(),
            }),
            (_, _, Some(path)) => Ok(RepositorySource::Archive { path: path.clone() }),
            (Some(path), _, _) => Ok(RepositorySource::Local { path: path.clone() }),
            (None, None, None) => bail!("one of <PATH>, --git or --archive is required"),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let mut config = SondeConfig::from_env();
    if let Some(concurrency) = args.concurrency {
        config.orchestrator = config.orchestrator.with_concurrency(concurrency);
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size.max(1);
    }
    if let Some(workspace) = &args.workspace {
        config.pipeline.workspace_root = workspace.clone();
    }

    let source = args.source()?;
    let repository_id = args
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let store = Arc::new(
        SqliteStore::open(&args.db)
            .with_context(|| format!("opening database {}", args.db.display()))?,
    );
    let orchestrator = Orchestrator::new(config.orchestrator.clone());
    AnalyzeRepositoryHandler::new(
        store.clone(),
        Arc::new(WorkspaceMaterializer::new(&config.pipeline.workspace_root)),
        Arc::new(ExtractorRegistry::new()),
        config.discovery.clone(),
        config.pipeline.clone(),
    )
    .register(&orchestrator);
    orchestrator.start();

    let payload = serde_json::to_value(&source)?;
    let job_id = orchestrator.enqueue(JobSpec::new(ANALYZE_REPOSITORY, &repository_id, payload));
    info!(job_id = %job_id, repository_id = %repository_id, db = %store.db_path().display(), "analysis queued");

    let job = orchestrator.wait(&job_id).await?;
    orchestrator.shutdown();

    println!("{}", serde_json::to_string_pretty(&job)?);
    if job.status != JobStatus::Completed {
        bail!(
            "analysis failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn discover(path: PathBuf, max_file_size: Option<u64>) -> anyhow::Result<()> {
    let mut config = SondeConfig::from_env().discovery;
    if let Some(limit) = max_file_size {
        config.max_file_size = limit;
    }
    let result = FileDiscovery::new(config).discover(&path)?;
    let files: Vec<_> = result
        .files
        .iter()
        .map(|f| json!({ "path": f.relative_path, "language": f.language, "size": f.size }))
        .collect();
    let out = json!({
        "files": files,
        "totalFiles": result.stats.total_files,
        "totalSize": result.stats.total_size,
        "languages": result.stats.languages,
        "primaryLanguage": primary_language(&result.stats.languages),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn extract(file: PathBuf) -> anyhow::Result<()> {
    let registry = ExtractorRegistry::new();
    let extension = extension_of(&file);
    if !registry.supports(&extension) {
        bail!("no extractor for {:?} files", extension);
    }
    let source = read_content(&file)?;
    let Some(facts) = registry.extract_for(&extension, &source) else {
        bail!("extraction failed for {}", file.display());
    };
    println!("{}", serde_json::to_string_pretty(&facts)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Analyze(args) => analyze(args).await,
        Commands::Discover {
            path,
            max_file_size,
        } => discover(path, max_file_size),
        Commands::Extract { file } => extract(file),
    }
}
