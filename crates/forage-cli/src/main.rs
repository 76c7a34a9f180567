use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use forage_client::{AdzunaSource, AnySource, ArbeitnowSource, JSearchSource};
use forage_core::{
    Credentials, Orchestrator, OrchestratorConfig, PlatformSelector, Query, QuotaLedger,
    SourceKindFilter, SourceRegistry, UpsertOutcome,
};
use forage_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "forage", version, about = "Quota-aware job listing aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search job sources and print merged, deduplicated listings
    Search {
        /// Free-text search terms
        #[arg(required = true)]
        terms: Vec<String>,

        /// Restrict to a single platform (e.g. "indeed", "linkedin")
        #[arg(short, long)]
        platform: Option<String>,

        /// Location filter
        #[arg(short, long)]
        location: Option<String>,

        /// Maximum results per backend
        #[arg(long, default_value_t = 50)]
        limit: usize,

        /// Include onsite jobs (default: remote only)
        #[arg(long)]
        include_onsite: bool,

        /// Consult API backends only
        #[arg(long, conflicts_with = "scrapers_only")]
        apis_only: bool,

        /// Consult scraper backends only
        #[arg(long)]
        scrapers_only: bool,

        /// Save results to the database (requires DATABASE_URL)
        #[arg(long)]
        save: bool,
    },

    /// List configured job sources
    Sources,

    /// Show quota status for metered backends
    Quota,

    /// Export stored records to CSV
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Maximum records to export
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("forage=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            terms,
            platform,
            location,
            limit,
            include_onsite,
            apis_only,
            scrapers_only,
            save,
        } => {
            let kinds = if apis_only {
                SourceKindFilter::ApisOnly
            } else if scrapers_only {
                SourceKindFilter::ScrapersOnly
            } else {
                SourceKindFilter::Any
            };
            let mut query = Query::new(terms.join(" "))
                .with_platforms(PlatformSelector::parse(platform.as_deref()))
                .with_remote_only(!include_onsite)
                .with_max_results(limit);
            if let Some(location) = location {
                query = query.with_location(location);
            }
            cmd_search(query, kinds, save).await?;
        }
        Commands::Sources => cmd_sources()?,
        Commands::Quota => cmd_quota()?,
        Commands::Export { output, limit } => cmd_export(&output, limit).await?,
    }

    Ok(())
}

/// Assemble the orchestrator configuration from the environment.
///
/// Recognized variables: every credential named in the registry (e.g.
/// `ADZUNA_APP_ID`), `FORAGE_LEDGER_PATH`, `FORAGE_CACHE_TTL_HOURS`, and
/// `FORAGE_<BACKEND>_LIMIT` monthly-limit overrides.
fn build_config(registry: &SourceRegistry) -> Result<OrchestratorConfig> {
    let mut credentials = Credentials::new();
    for descriptor in registry.all() {
        for name in &descriptor.required_credentials {
            if let Ok(value) = std::env::var(name) {
                credentials.insert(name, value);
            }
        }
    }

    let ledger_path =
        std::env::var("FORAGE_LEDGER_PATH").unwrap_or_else(|_| "forage_usage.json".to_string());
    let mut config = OrchestratorConfig::default()
        .with_credentials(credentials)
        .with_ledger_path(ledger_path);

    if let Ok(raw) = std::env::var("FORAGE_CACHE_TTL_HOURS") {
        let hours: u64 = raw
            .parse()
            .with_context(|| format!("Invalid FORAGE_CACHE_TTL_HOURS '{raw}'"))?;
        config = config.with_cache_ttl(Duration::from_secs(hours * 60 * 60));
    }

    for descriptor in registry.all().iter().filter(|d| d.is_metered()) {
        let var = format!("FORAGE_{}_LIMIT", descriptor.name.to_uppercase());
        if let Ok(raw) = std::env::var(&var) {
            let limit: u32 = raw
                .parse()
                .with_context(|| format!("Invalid {var} '{raw}'"))?;
            config = config.with_quota_override(&descriptor.name, limit);
        }
    }

    Ok(config)
}

/// Construct a client for every backend whose requirements are met.
/// Backends that cannot be constructed are left out of the map — the
/// orchestrator reports them as skipped rather than failing the run.
async fn build_sources(config: &OrchestratorConfig) -> HashMap<String, AnySource> {
    let mut sources = HashMap::new();

    match AdzunaSource::new(&config.credentials) {
        Ok(source) => {
            sources.insert("adzuna".to_string(), AnySource::Adzuna(source));
        }
        Err(e) => tracing::debug!(error = %e, "Adzuna client not constructed"),
    }

    match JSearchSource::new(&config.credentials) {
        Ok(source) => {
            sources.insert("jsearch".to_string(), AnySource::JSearch(source));
        }
        Err(e) => tracing::debug!(error = %e, "JSearch client not constructed"),
    }

    match ArbeitnowSource::new() {
        Ok(source) => {
            sources.insert("arbeitnow".to_string(), AnySource::Arbeitnow(source));
        }
        Err(e) => tracing::debug!(error = %e, "Arbeitnow client not constructed"),
    }

    #[cfg(feature = "browser")]
    match forage_client::Web3CareerSource::new().await {
        Ok(source) => {
            sources.insert("web3career".to_string(), AnySource::Web3Career(source));
        }
        Err(e) => tracing::warn!(error = %e, "Browser scraper not available"),
    }

    sources
}

async fn cmd_search(query: Query, kinds: SourceKindFilter, save: bool) -> Result<()> {
    let registry = SourceRegistry::with_defaults();
    let config = build_config(&registry)?;
    let sources = build_sources(&config).await;

    let orchestrator =
        Orchestrator::new(registry, sources, config).map_err(|e| anyhow::anyhow!(e))?;

    // Ctrl-C abandons in-flight backends; accumulated results still print.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received; returning partial results");
            trigger.cancel();
        }
    });

    let outcome = orchestrator
        .fetch_with(&query, kinds, &cancel)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    for record in &outcome.records {
        println!(
            "[{}] {} — {} ({})",
            record.source,
            record.title,
            record.company,
            record.location.as_deref().unwrap_or("location n/a"),
        );
        if let Some(salary) = &record.salary {
            println!("    {salary}");
        }
        println!("    {}", record.url);
    }

    println!(
        "\nFound {} unique listings from {} source(s)",
        outcome.records.len(),
        outcome.report.successes()
    );
    print!("{}", outcome.report);

    if save && !outcome.records.is_empty() {
        let repo = connect_db().await?;
        let mut inserted = 0usize;
        let mut already_present = 0usize;
        for record in &outcome.records {
            match repo.upsert(record).await.map_err(|e| anyhow::anyhow!(e))? {
                UpsertOutcome::Inserted => inserted += 1,
                UpsertOutcome::AlreadyPresent => already_present += 1,
            }
        }
        println!("Saved {inserted} new records ({already_present} already stored)");
    }

    Ok(())
}

fn cmd_sources() -> Result<()> {
    let registry = SourceRegistry::with_defaults();
    let config = build_config(&registry)?;

    println!("Configured job sources (fallback order):");
    for descriptor in registry.all() {
        let missing = config.credentials.missing(&descriptor.required_credentials);
        let readiness = if missing.is_empty() {
            "ready".to_string()
        } else {
            format!("missing credentials: {}", missing.join(", "))
        };
        let quota = match descriptor.monthly_limit() {
            Some(limit) => format!(", {limit} calls/month"),
            None => String::new(),
        };
        println!(
            "  {} [{}{}] covers {} — {}",
            descriptor.name,
            descriptor.kind.as_str(),
            quota,
            descriptor.platforms.join(", "),
            readiness,
        );
    }

    Ok(())
}

fn cmd_quota() -> Result<()> {
    let registry = SourceRegistry::with_defaults();
    let config = build_config(&registry)?;
    let limits = registry.metered_limits(&config.quota_overrides);
    let ledger = QuotaLedger::open(config.ledger_path, limits).map_err(|e| anyhow::anyhow!(e))?;

    println!("API quota status (period resets monthly, UTC):");
    for status in ledger.status_all() {
        println!(
            "  [{}] {}: {}/{} calls ({:.1}%) — {} remaining in {}",
            status.level().to_uppercase(),
            status.backend,
            status.used,
            status.limit,
            status.percent,
            status.limit - status.used,
            status.period,
        );
    }

    Ok(())
}

async fn cmd_export(output: &PathBuf, limit: usize) -> Result<()> {
    let repo = connect_db().await?;
    let records = repo
        .list_recent(limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if records.is_empty() {
        println!("No stored records to export");
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record([
        "job_source_id",
        "source",
        "title",
        "company",
        "location",
        "salary",
        "url",
        "tags",
        "date_posted",
        "date_found",
        "description",
        "is_remote",
    ])?;
    for record in &records {
        writer.write_record([
            record.source_id.clone().unwrap_or_default(),
            record.source.clone(),
            record.title.clone(),
            record.company.clone(),
            record.location.clone().unwrap_or_default(),
            record.salary.clone().unwrap_or_default(),
            record.url.clone(),
            record.tags.join(", "),
            record
                .date_posted
                .map(|d| d.to_string())
                .unwrap_or_default(),
            record.date_found.to_string(),
            record.description.clone().unwrap_or_default(),
            record.is_remote.to_string(),
        ])?;
    }
    writer.flush()?;

    println!("Exported {} records to {}", records.len(), output.display());
    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and run migrations.
async fn connect_db() -> Result<forage_db::JobRepository> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let database = Database::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    database.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(database.job_repo())
}
