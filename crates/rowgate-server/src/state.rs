use std::sync::Arc;

use rowgate_core::config::Config;
use rowgate_core::descriptor::ActionDescriptor;
use rowgate_core::session::SessionSigner;

use crate::db::{Db, ResultRow};
use crate::error::{ApiError, ErrorKind};
use crate::provider::ConnectClient;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Db>,
    pub signer: Arc<SessionSigner>,
    pub connect: Arc<ConnectClient>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Db::connect(&config.driver, &config.dsn).await?;
        let signer = SessionSigner::new(
            config.jwt_secret.clone(),
            config.jwt_issuer.clone(),
            config.jwt_expire,
        );
        let connect = ConnectClient::new(config.connect.clone());
        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            signer: Arc::new(signer),
            connect: Arc::new(connect),
        })
    }

    /// Wrap an error kind in the envelope style this deployment uses.
    pub fn error(&self, kind: ErrorKind) -> ApiError {
        ApiError::new(kind, self.config.envelope)
    }

    /// Descriptor lookup via the config-supplied query. A store error is a
    /// lookup miss — the same outcome as no row, per the dispatch contract —
    /// so it is logged here and surfaces as `None`.
    pub async fn lookup(&self, action: &str, method: &str) -> Option<ActionDescriptor> {
        match self
            .db
            .lookup_descriptor(&self.config.query, action, method)
            .await
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::error!(error = %e, action, method, "descriptor lookup failed");
                None
            }
        }
    }

    /// Execute a rendered query and normalize the rows.
    pub async fn fetch(&self, sql: &str) -> Result<Vec<ResultRow>, ErrorKind> {
        self.db.fetch(sql).await.map_err(|e| ErrorKind::Execution {
            detail: e.to_string(),
        })
    }
}
