use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use infinipaper_core::{AppConfig, CoreError, Database, ExitCode, PaperId};
use infinipaper_science::{
    DuplicateMerger, GreedyTitleGrouping, GroupingStrategy, MetadataResolver, Resolution,
    ScienceError,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "infinipaper",
    about = "Resolve paper metadata from PDFs and merge duplicate records",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format. Also enabled by setting INFINIPAPER_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn", env = "INFINIPAPER_LOG")]
    log_level: String,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve metadata for a PDF without storing anything.
    Resolve {
        pdf: PathBuf,
        /// DOI already known for this paper.
        #[arg(long)]
        doi: Option<String>,
        /// arXiv identifier already known for this paper.
        #[arg(long)]
        arxiv: Option<String>,
    },

    /// Resolve a PDF, copy it into storage and record the paper.
    Import {
        pdf: PathBuf,
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        arxiv: Option<String>,
        /// Record the paper without copying the PDF.
        #[arg(long)]
        no_copy: bool,
    },

    /// List stored papers.
    List {
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Show one paper with its authors.
    Show { id: PaperId },

    /// Find and merge duplicate papers.
    Dedup {
        #[command(subcommand)]
        action: DedupAction,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information.
    Version,
}

#[derive(Subcommand)]
enum DedupAction {
    /// Print candidate duplicate groups among papers without a DOI.
    Preview {
        /// Similarity (0-100) required to group two titles.
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Merge papers into the one given by --keep.
    Merge {
        #[arg(required = true, num_args = 2..)]
        ids: Vec<PaperId>,
        #[arg(long)]
        keep: PaperId,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Get a specific config key.
    Get { key: String },
    /// Print the config file location.
    Path,
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code_for(&err) as i32);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let json_output = cli.json || std::env::var("INFINIPAPER_JSON").as_deref() == Ok("1");
    let config = AppConfig::load()?;

    match cli.command {
        Commands::Resolve { pdf, doi, arxiv } => {
            ensure_file(&pdf)?;
            let resolver = MetadataResolver::from_config(&config.sources)?;
            let resolution = resolver.resolve_file(&pdf, doi, arxiv).await;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":resolution,"meta":{"duration_ms":dur}}))?;
            } else {
                print_resolution(&resolution);
            }
        }

        Commands::Import { pdf, doi, arxiv, no_copy } => {
            ensure_file(&pdf)?;
            let resolver = MetadataResolver::from_config(&config.sources)?;
            let resolution = resolver.resolve_file(&pdf, doi, arxiv).await;

            let stored = if no_copy {
                pdf.clone()
            } else {
                store_pdf(&pdf, &config.pdf_dir())?
            };
            let mut new_paper = resolution
                .metadata
                .to_new_paper(Some(stored.to_string_lossy().into_owned()));
            if new_paper.title.trim().is_empty() {
                new_paper.title = pdf
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Untitled".to_string());
            }

            let db = open_db(&config)?;
            let outcome = db.import_paper(&new_paper)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "import": outcome, "report": resolution.report },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if outcome.created {
                println!("Imported #{}: {}", outcome.paper.id, outcome.paper.title);
            } else {
                println!(
                    "Matched existing #{} by DOI, filled: {}",
                    outcome.paper.id,
                    outcome.fields_filled.join(", ")
                );
            }
        }

        Commands::List { limit } => {
            let db = open_db(&config)?;
            let papers: Vec<_> = db.list_papers()?.into_iter().take(limit).collect();
            let dur = start.elapsed().as_millis();

            if json_output {
                let total = db.count_papers()?;
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": papers, "total": total, "limit": limit },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if papers.is_empty() {
                println!("No papers stored. Use `infinipaper import` to add one.");
            } else {
                for paper in &papers {
                    let year = paper.year.map(|y| y.to_string()).unwrap_or_default();
                    let doi = paper.doi.as_deref().unwrap_or("");
                    println!("{:>6}  {:<50}  {:>4}  {doi}", paper.id, paper.title, year);
                }
            }
        }

        Commands::Show { id } => {
            let db = open_db(&config)?;
            let paper = db.get_paper(id)?;
            let authors = db.authors_of(id)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "paper": paper, "authors": authors },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("#{} {}", paper.id, paper.title);
                if let Some(year) = paper.year {
                    println!("  year:    {year}");
                }
                if let Some(venue) = &paper.venue {
                    println!("  venue:   {venue}");
                }
                if let Some(doi) = &paper.doi {
                    println!("  doi:     {doi}");
                }
                for author in &authors {
                    match &author.affiliation {
                        Some(aff) => println!("  author:  {} ({aff})", author.name),
                        None => println!("  author:  {}", author.name),
                    }
                }
            }
        }

        Commands::Dedup { action } => match action {
            DedupAction::Preview { threshold } => {
                let db = open_db(&config)?;
                let papers = db.list_papers()?;
                let mut grouping = GreedyTitleGrouping::from_config(&config.dedup);
                if let Some(threshold) = threshold {
                    grouping.threshold = threshold;
                }
                let groups = grouping.group(&papers);
                let dur = start.elapsed().as_millis();

                if json_output {
                    print_json(&serde_json::json!({"status":"ok","data":{"groups":groups},"meta":{"duration_ms":dur}}))?;
                } else if groups.is_empty() {
                    println!("No duplicate candidates.");
                } else {
                    let titles: BTreeMap<PaperId, &str> =
                        papers.iter().map(|p| (p.id, p.title.as_str())).collect();
                    for (n, group) in groups.iter().enumerate() {
                        println!("Group {}:", n + 1);
                        for id in group {
                            println!("  {id:>6}  {}", titles.get(id).copied().unwrap_or(""));
                        }
                    }
                }
            }
            DedupAction::Merge { ids, keep } => {
                let db = open_db(&config)?;
                let report = DuplicateMerger::new(&db).merge(&ids, keep)?;
                let dur = start.elapsed().as_millis();

                if json_output {
                    print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
                } else {
                    println!("Kept #{}; merged {:?}", report.keep, report.merged);
                    if !report.skipped.is_empty() {
                        println!("Skipped missing: {:?}", report.skipped);
                    }
                    if !report.fields_filled.is_empty() {
                        println!("Filled: {}", report.fields_filled.join(", "));
                    }
                }
            }
        },

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::List => {
                    let kv = config_key_values(&config);
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":kv,"meta":{"duration_ms":dur}}))?;
                    } else {
                        for (k, v) in &kv {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Get { key } => {
                    let kv = config_key_values(&config);
                    match kv.get(key.as_str()) {
                        Some(val) => {
                            if json_output {
                                print_json(&serde_json::json!({"status":"ok","data":{"key":key,"value":val},"meta":{"duration_ms":dur}}))?;
                            } else {
                                println!("{val}");
                            }
                        }
                        None => {
                            eprintln!("Unknown config key: {key}");
                            std::process::exit(ExitCode::NotFound as i32);
                        }
                    }
                }
                ConfigAction::Path => {
                    let path = AppConfig::config_path();
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path,"exists":path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
            }
        }

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"version":version},"meta":{"duration_ms":dur}}))?;
            } else {
                println!("infinipaper v{version}");
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn print_resolution(resolution: &Resolution) {
    let meta = &resolution.metadata;
    let show = |label: &str, value: Option<String>| {
        if let Some(value) = value {
            let source = resolution
                .metadata
                .field_sources
                .get(label)
                .map(|s| s.as_str())
                .unwrap_or("-");
            println!("{label:<20} {value}  [{source}]");
        }
    };
    show("title", meta.title.clone());
    show("venue", meta.venue.clone());
    show("year", meta.year.map(|y| y.to_string()));
    show("doi", meta.doi.clone());
    show("url", meta.url.clone());
    show("open_access_pdf_url", meta.open_access_pdf_url.clone());
    show("cited_by_count", meta.cited_by_count.map(|c| c.to_string()));
    for author in &meta.authors {
        println!("{:<20} {}", "author", author.name);
    }
    if !resolution.report.errors.is_empty() {
        eprintln!("{} lookup(s) failed:", resolution.report.errors.len());
        for err in &resolution.report.errors {
            eprintln!("  {err}");
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(err) = err.downcast_ref::<ScienceError>() {
        return match err {
            ScienceError::AmbiguousMerge(_) => ExitCode::Conflict,
            ScienceError::NotFound(_) | ScienceError::Storage(CoreError::PaperNotFound(_)) => {
                ExitCode::NotFound
            }
            ScienceError::SourceUnavailable(_) | ScienceError::Http(_) => ExitCode::NetworkError,
            ScienceError::InvalidDoi(_) | ScienceError::InvalidArxivId(_) => ExitCode::InvalidArgs,
            _ => ExitCode::GeneralError,
        };
    }
    match err.downcast_ref::<CoreError>() {
        Some(CoreError::PaperNotFound(_)) => ExitCode::NotFound,
        Some(CoreError::DuplicateDoi(_)) => ExitCode::Conflict,
        Some(CoreError::ConfigError(_)) => ExitCode::InvalidArgs,
        _ => ExitCode::GeneralError,
    }
}

fn ensure_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("not a file: {}", path.display());
    }
    Ok(())
}

/// Copy `pdf` into `dir`. A stored file with the same bytes is reused; a
/// different file under the same name gets a numeric suffix (`paper-1.pdf`).
fn store_pdf(pdf: &Path, dir: &Path) -> Result<PathBuf> {
    let name = pdf
        .file_name()
        .with_context(|| format!("no file name in {}", pdf.display()))?;
    let bytes = std::fs::read(pdf).with_context(|| format!("reading {}", pdf.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let original = Path::new(name);
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = original.extension().map(|e| e.to_string_lossy().into_owned());

    let mut suffix = 0u32;
    loop {
        let candidate = match (suffix, &ext) {
            (0, _) => dir.join(name),
            (n, Some(ext)) => dir.join(format!("{stem}-{n}.{ext}")),
            (n, None) => dir.join(format!("{stem}-{n}")),
        };
        if !candidate.exists() {
            std::fs::write(&candidate, &bytes)
                .with_context(|| format!("copying {} to {}", pdf.display(), candidate.display()))?;
            tracing::info!(from = %pdf.display(), to = %candidate.display(), "pdf stored");
            return Ok(candidate);
        }
        let existing = std::fs::read(&candidate)
            .with_context(|| format!("reading {}", candidate.display()))?;
        if existing == bytes {
            tracing::debug!(path = %candidate.display(), "identical pdf already stored");
            return Ok(candidate);
        }
        suffix += 1;
    }
}

fn open_db(config: &AppConfig) -> Result<Database> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(&db_path)?)
}

fn config_key_values(config: &AppConfig) -> BTreeMap<&'static str, String> {
    let sources = &config.sources;
    let mut map = BTreeMap::new();
    map.insert("database_path", config.database_path().to_string_lossy().to_string());
    map.insert("storage_dir", config.storage_dir().to_string_lossy().to_string());
    map.insert("crossref_url", sources.crossref_url.clone());
    map.insert("openalex_url", sources.openalex_url.clone());
    map.insert("semantic_scholar_url", sources.semantic_scholar_url.clone());
    map.insert("arxiv_url", sources.arxiv_url.clone());
    map.insert("grobid_url", sources.grobid_url.clone().unwrap_or_default());
    map.insert("polite_email", sources.polite_email.clone().unwrap_or_default());
    map.insert("timeout_secs", sources.http_timeout().as_secs().to_string());
    map.insert("cache_enabled", sources.cache_enabled.to_string());
    map.insert("dedup_threshold", config.dedup.threshold.to_string());
    map.insert("dedup_year_penalty", config.dedup.year_penalty.to_string());
    map
}
