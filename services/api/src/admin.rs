use clap::Args;
use hr_desk::access::{AccessDecision, AccessPolicy};
use hr_desk::config::{AppConfig, DatabaseConfig};
use hr_desk::database::{Connector, ScriptProvider, SqlGateway};
use hr_desk::error::AppError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

const SCHEMA_SCRIPT: &str = "schema.sql";

#[derive(Args, Debug, Default)]
pub(crate) struct InitDbArgs {
    /// SQL file applied after the schema, e.g. sql/seed.sql
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AccessCheckArgs {
    /// Role name as stored for the user
    #[arg(long)]
    pub(crate) role: String,
    /// Section to check, e.g. interviews or reports_build
    #[arg(long)]
    pub(crate) section: String,
}

pub(crate) fn run_init_db(args: InitDbArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    hr_desk::telemetry::init(&config.telemetry)?;

    initialize_database(&config.database, args.seed.as_deref())?;
    println!("Database ready at {}", config.database.path.display());
    if let Some(seed) = args.seed {
        println!("  Seed applied: {}", seed.display());
    }
    Ok(())
}

/// Create the database file when absent, apply `schema.sql` from the script
/// tree, then the optional seed file.
pub(crate) fn initialize_database(
    database: &DatabaseConfig,
    seed: Option<&Path>,
) -> Result<(), AppError> {
    if let Some(parent) = database.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let scripts = Arc::new(ScriptProvider::load(&database.scripts_dir)?);
    let gateway = SqlGateway::new(
        scripts,
        Connector::creating(database.path.clone()),
        database.debug,
    );
    gateway.apply_script(SCHEMA_SCRIPT)?;
    info!(path = %database.path.display(), "schema applied");

    if let Some(seed) = seed {
        let name = seed
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "seed.sql".to_string());
        let text = fs::read_to_string(seed)?;
        let seed_scripts = ScriptProvider::from_scripts([(name.clone(), text)])?;
        SqlGateway::new(
            Arc::new(seed_scripts),
            Connector::new(database.path.clone()),
            database.debug,
        )
        .apply_script(&name)?;
        info!(seed = %seed.display(), "seed applied");
    }
    Ok(())
}

pub(crate) fn run_access_check(args: AccessCheckArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let policy = AccessPolicy::load(&config.access_policy_path)?;
    println!("{}", describe(&policy.check(&args.role, &args.section)));
    Ok(())
}

fn describe(decision: &AccessDecision) -> String {
    match decision {
        AccessDecision::Allow => "allow".to_string(),
        AccessDecision::Deny {
            role,
            section,
            allowed,
        } if allowed.is_empty() => {
            format!("deny: role '{role}' has no sections (requested '{section}')")
        }
        AccessDecision::Deny {
            role,
            section,
            allowed,
        } => format!(
            "deny: role '{role}' may enter [{}], not '{section}'",
            allowed.join(", ")
        ),
    }
}
