use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::store::{DocumentStore, MemoryStore, PgDocumentStore};
use crate::users::{repo::UserRepo, services::UserService, User};

/// Shared, read-only after start-up.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn DocumentStore<User>> = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                sqlx::migrate!("./migrations")
                    .run(&db)
                    .await
                    .context("run migrations")?;
                info!("using postgres document store");
                Arc::new(PgDocumentStore::<User>::new(db)) as Arc<dyn DocumentStore<User>>
            }
            None => {
                warn!("DATABASE_URL not set; using in-memory store, data will not survive a restart");
                Arc::new(MemoryStore::<User>::new()) as Arc<dyn DocumentStore<User>>
            }
        };

        Ok(Self::from_parts(config, store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn DocumentStore<User>>) -> Self {
        let users = UserService::new(UserRepo::new(store), config.jwt.secret.as_str());
        Self { config, users }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_store(Arc::new(MemoryStore::<User>::new()))
    }

    #[cfg(test)]
    pub fn fake_with_store(store: Arc<dyn DocumentStore<User>>) -> Self {
        use crate::config::JwtConfig;

        let config = Arc::new(AppConfig {
            database_url: None,
            max_connections: 1,
            jwt: JwtConfig {
                secret: "test-secret".into(),
            },
        });
        Self::from_parts(config, store)
    }
}
