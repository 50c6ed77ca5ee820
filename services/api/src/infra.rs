use hr_desk::access::{AccessGate, AccessPolicy};
use hr_desk::auth::{AuthService, SqlCredentialStore};
use hr_desk::cache::{MemoryCache, ReadThroughCache};
use hr_desk::config::{AppConfig, CacheConfig};
use hr_desk::database::{Connector, ScriptProvider, SqlGateway};
use hr_desk::error::AppError;
use hr_desk::session::InMemorySessionStore;
use hr_desk::workflows::interviews::{AppointmentService, SqlInterviewStore};
use hr_desk::workflows::{Catalog, QueryRunner, ReportRunner};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Sessions = InMemorySessionStore;

/// Every workflow service, sharing one session store and one gateway.
pub(crate) struct Components {
    pub(crate) auth: Arc<AuthService<SqlCredentialStore, Sessions>>,
    pub(crate) interviews: Arc<AppointmentService<SqlInterviewStore, Sessions>>,
    pub(crate) queries: Arc<QueryRunner<Sessions>>,
    pub(crate) reports: Arc<ReportRunner<Sessions>>,
}

impl Components {
    /// Load scripts, catalog and policy once; any problem aborts startup.
    pub(crate) fn assemble(config: &AppConfig) -> Result<Self, AppError> {
        let scripts = Arc::new(ScriptProvider::load(&config.database.scripts_dir)?);
        let catalog = Catalog::load(&config.catalog_path)?;
        catalog.verify(&scripts)?;
        let catalog = Arc::new(catalog);
        let policy = Arc::new(AccessPolicy::load(&config.access_policy_path)?);

        info!(
            scripts = scripts.len(),
            queries = catalog.queries().len(),
            reports = catalog.reports().len(),
            database = %config.database.path.display(),
            "startup resources loaded"
        );

        let gateway = SqlGateway::new(
            scripts,
            Connector::new(config.database.path.clone()),
            config.database.debug,
        );
        let sessions = Arc::new(Sessions::with_idle_timeout(config.session.idle_timeout));
        let gate = AccessGate::new(policy.clone());

        Ok(Self {
            auth: Arc::new(AuthService::new(
                Arc::new(SqlCredentialStore::new(gateway.clone())),
                sessions.clone(),
                policy,
            )),
            interviews: Arc::new(AppointmentService::new(
                gate.clone(),
                Arc::new(SqlInterviewStore::new(gateway.clone())),
                sessions.clone(),
                candidate_cache(&config.cache),
            )),
            queries: Arc::new(QueryRunner::new(
                gate.clone(),
                gateway.clone(),
                catalog.clone(),
                sessions.clone(),
            )),
            reports: Arc::new(ReportRunner::new(gate, gateway, catalog, sessions)),
        })
    }
}

fn candidate_cache(config: &CacheConfig) -> ReadThroughCache {
    if config.enabled {
        ReadThroughCache::new(Arc::new(MemoryCache::default()), config.ttl)
    } else {
        info!("candidate cache disabled");
        ReadThroughCache::disabled()
    }
}
