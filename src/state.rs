use std::sync::Arc;

use crate::config::Config;
use crate::db::Store;
use crate::services::notifier::{self, Notifier};
use crate::services::rate_limit::{self, RateLimiter};
use crate::services::{
    AuditRecorder, AuthService, CategoryService, IncidentService, SeaOrmAuthService,
    SeaOrmCategoryService, SeaOrmIncidentService,
};

/// Application context built once at startup and handed to every component.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub audit: AuditRecorder,

    pub notifier: Arc<dyn Notifier>,

    pub auth_service: Arc<dyn AuthService>,

    pub category_service: Arc<dyn CategoryService>,

    pub incident_service: Arc<dyn IncidentService>,

    pub login_limiter: Arc<dyn RateLimiter>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let notifier = notifier::build_notifier(&config.notifications)?;
        Self::with_store(config, store, notifier)
    }

    /// Wires the services over an already opened store.
    pub fn with_store(
        config: Config,
        store: Store,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let audit = AuditRecorder::new(store.clone());

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.clone(),
            audit.clone(),
            notifier.clone(),
        )?) as Arc<dyn AuthService>;

        let category_service = Arc::new(SeaOrmCategoryService::new(store.clone(), audit.clone()))
            as Arc<dyn CategoryService>;

        let incident_service = Arc::new(SeaOrmIncidentService::new(
            store.clone(),
            audit.clone(),
            notifier.clone(),
        )) as Arc<dyn IncidentService>;

        let login_limiter = rate_limit::build_login_limiter(&config.security.login_rate_limit);

        Ok(Self {
            config,
            store,
            audit,
            notifier,
            auth_service,
            category_service,
            incident_service,
            login_limiter,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}
