//! rcm-e2e - command-line entry point of the RCM E2E harness

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rcm_e2e::auth;
use rcm_e2e::data::{InvalidField, TestDataGenerator};
use rcm_e2e::dates;
use rcm_e2e::job::owner_filter;
use rcm_e2e::pages::ClaimFilters;
use rcm_e2e::playwright::PlaywrightSession;
use rcm_e2e::workflows::Workflows;
use rcm_e2e::{EnvConfig, Environment, JobKind, JobQuery, TimeoutPolicy};

#[derive(Parser)]
#[command(name = "rcm-e2e")]
#[command(about = "E2E harness for RCM Direct Billing batch jobs")]
#[command(version)]
struct Cli {
    /// Target environment (dev, staging, prod)
    #[arg(short, long, global = true)]
    env: Option<String>,

    /// YAML configuration file replacing the built-in defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Show the browser window
    #[arg(long, global = true)]
    headed: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    PostCharges,
    ClaimGeneration,
}

impl From<Kind> for JobKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::PostCharges => JobKind::PostCharges,
            Kind::ClaimGeneration => JobKind::ClaimGeneration,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Record {
    Patient,
    Billing,
    Claim,
    Appointment,
    Insurance,
    InvalidPatient,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and save the session for later runs
    Login {
        /// Ignore a saved session
        #[arg(long)]
        force: bool,
    },

    /// Delete a user's jobs of one kind
    Cleanup {
        #[arg(long, value_enum)]
        kind: Kind,

        /// "Requested By" filter (defaults to the configured user)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Wait for a running job to complete
    WaitJob {
        #[arg(long, value_enum)]
        kind: Kind,

        /// Text identifying the job row
        #[arg(long, default_value = "Services through")]
        description: String,

        #[arg(long)]
        owner: Option<String>,

        /// Fail instead of warning when the job does not finish
        #[arg(long)]
        hard: bool,

        #[arg(long)]
        max_attempts: Option<u32>,

        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Post charges for an entity over one month
    PostCharges {
        #[arg(long)]
        entity: String,

        /// Months relative to the current one (-1 = previous month)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        month_offset: i32,

        #[arg(long)]
        owner: Option<String>,
    },

    /// Run claim generation
    GenerateClaims {
        #[arg(long)]
        owner: Option<String>,

        /// Month whose last day is the Services Through date (-1 = previous month)
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        month_offset: i32,

        /// Services From date (MM/DD/YYYY)
        #[arg(long)]
        services_from: Option<String>,

        /// Services Through date (MM/DD/YYYY), overrides --month-offset
        #[arg(long)]
        services_through: Option<String>,

        #[arg(long)]
        division: Option<String>,

        #[arg(long)]
        region: Option<String>,

        #[arg(long)]
        area: Option<String>,

        #[arg(long)]
        entity: Option<String>,

        #[arg(long)]
        paying_agency: Option<String>,

        #[arg(long)]
        plan: Option<String>,

        #[arg(long)]
        job_limit: Option<u32>,

        #[arg(long)]
        require_month_end_close: Option<bool>,

        #[arg(long)]
        require_all_charges_posted: Option<bool>,
    },

    /// Print synthetic records as JSON
    GenerateData {
        #[arg(value_enum)]
        record: Record,

        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Broken field for invalid-patient (firstName, lastName, ...)
        #[arg(long, default_value = "missingRequired")]
        field: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Commands::GenerateData { record, count, seed, field } = &cli.command {
        return generate_data(*record, *count, *seed, field);
    }

    let environment = match &cli.env {
        Some(name) => name.parse()?,
        None => Environment::from_env()?,
    };
    let mut config = EnvConfig::resolve(environment, cli.config.as_deref())?;
    if cli.headed {
        config.headless = false;
    }

    info!("RCM E2E v{} against {} ({})", env!("CARGO_PKG_VERSION"), config.name, config.base_url);

    if let Commands::Login { force } = cli.command {
        if force && config.storage_state.exists() {
            std::fs::remove_file(&config.storage_state)
                .with_context(|| format!("removing {}", config.storage_state.display()))?;
        }
        let session = auth::ensure_session(&config).await?;
        session.close().await?;
        return Ok(());
    }

    let session = auth::ensure_session(&config).await?;
    let result = run(&cli.command, &session, &config).await;
    session.close().await?;
    result
}

async fn run(command: &Commands, session: &PlaywrightSession, config: &EnvConfig) -> anyhow::Result<()> {
    let workflows = Workflows::new(session, config);
    let default_owner = config.owner_filter();

    match command {
        Commands::Cleanup { kind, owner } => {
            let deleted = workflows.cleanup((*kind).into(), owner_or(owner, default_owner)).await?;
            println!("{}", serde_json::json!({ "deleted": deleted }));
        }
        Commands::WaitJob {
            kind,
            description,
            owner,
            hard,
            max_attempts,
            interval_secs,
        } => {
            let kind: JobKind = (*kind).into();
            let mut overridden = config.clone();
            let poller = &mut overridden.jobs.get_mut(kind).poller;
            if let Some(interval) = interval_secs {
                poller.budget.interval_ms = Duration::from_secs(*interval).as_millis() as u64;
            }
            if let Some(attempts) = max_attempts {
                poller.budget.max_attempts = Some(*attempts);
            }

            let mut query = JobQuery::new(description.clone());
            if let Some(owner) = owner {
                query = query.owned_by(owner.as_str());
            }
            let policy = if *hard { TimeoutPolicy::Hard } else { TimeoutPolicy::Soft };

            let completed = Workflows::new(session, &overridden)
                .wait_for_job(kind, &query, policy)
                .await?;
            println!("{}", serde_json::json!({ "completed": completed }));
        }
        Commands::PostCharges {
            entity,
            month_offset,
            owner,
        } => {
            let report = workflows
                .post_charges(entity, *month_offset, owner_or(owner, default_owner))
                .await?;
            print_json(&report)?;
        }
        Commands::GenerateClaims {
            owner,
            month_offset,
            services_from,
            services_through,
            division,
            region,
            area,
            entity,
            paying_agency,
            plan,
            job_limit,
            require_month_end_close,
            require_all_charges_posted,
        } => {
            for date in [services_from, services_through].into_iter().flatten() {
                if dates::parse_us(date).is_none() {
                    anyhow::bail!("'{}' is not an MM/DD/YYYY date", date);
                }
            }

            let filters = ClaimFilters {
                services_from: services_from.clone(),
                services_through: Some(
                    services_through
                        .clone()
                        .unwrap_or_else(|| dates::last_date_of_month_with_offset(*month_offset)),
                ),
                division: division.clone(),
                region: region.clone(),
                area: area.clone(),
                entity: entity.clone(),
                paying_agency: paying_agency.clone(),
                plan: plan.clone(),
                job_limit: *job_limit,
                require_month_end_close: *require_month_end_close,
                require_all_charges_posted: *require_all_charges_posted,
            };

            let report = workflows
                .generate_claims(&filters, owner_or(owner, default_owner))
                .await?;
            print_json(&report)?;
        }
        Commands::Login { .. } | Commands::GenerateData { .. } => {}
    }
    Ok(())
}

fn generate_data(record: Record, count: usize, seed: Option<u64>, field: &str) -> anyhow::Result<()> {
    let mut generator = match seed {
        Some(seed) => TestDataGenerator::seeded(seed, dates::today()),
        None => TestDataGenerator::new(),
    };
    let invalid: InvalidField = field.parse()?;

    let records = (0..count)
        .map(|_| match record {
            Record::Patient => serde_json::to_value(generator.patient()),
            Record::Billing => serde_json::to_value(generator.billing()),
            Record::Claim => serde_json::to_value(generator.claim()),
            Record::Appointment => serde_json::to_value(generator.appointment()),
            Record::Insurance => serde_json::to_value(generator.insurance()),
            Record::InvalidPatient => serde_json::to_value(generator.invalid_patient(invalid)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    print_json(&records)
}

/// Explicit owner filter, else the configured user. Blank values count as unset.
fn owner_or<'a>(owner: &'a Option<String>, fallback: Option<&'a str>) -> Option<&'a str> {
    owner_filter(owner.as_deref()).or_else(|| owner_filter(fallback))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
