use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tokio::sync::{Mutex, RwLock};

use rowgate_core::descriptor::ActionDescriptor;

use crate::normalize;

pub use crate::normalize::ResultRow;

// Pool tuning is fixed: bounded connections with a bounded lifetime, shared
// by every request.
const MAX_CONNECTIONS: u32 = 25;
const CONN_MAX_LIFETIME: Duration = Duration::from_secs(300);
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("unsupported driver '{0}' (expected postgres, mysql, or sqlite)")]
    UnsupportedDriver(String),

    #[error("database connect failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("{0}")]
    Query(#[source] sqlx::Error),
}

// ---------------------------------------------------------------------------
// Driver / Pool
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres,
    MySql,
    Sqlite,
}

impl Driver {
    fn from_name(name: &str) -> Result<Self, DbError> {
        match name {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(DbError::UnsupportedDriver(other.to_string())),
        }
    }
}

#[derive(Clone, Debug)]
enum Pool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

async fn open(driver: Driver, dsn: &str) -> Result<Pool, sqlx::Error> {
    match driver {
        Driver::Postgres => Ok(Pool::Postgres(
            PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .max_lifetime(CONN_MAX_LIFETIME)
                .connect(dsn)
                .await?,
        )),
        Driver::MySql => Ok(Pool::MySql(
            MySqlPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .max_lifetime(CONN_MAX_LIFETIME)
                .connect(dsn)
                .await?,
        )),
        Driver::Sqlite => Ok(Pool::Sqlite(
            SqlitePoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .max_lifetime(CONN_MAX_LIFETIME)
                .connect(dsn)
                .await?,
        )),
    }
}

// ---------------------------------------------------------------------------
// Db
// ---------------------------------------------------------------------------

/// Pooled database handle. The pool sits behind a read/write lock so the
/// reconnect watchdog can swap it out while in-flight requests block on the
/// read side until the store is reachable again.
#[derive(Debug)]
pub struct Db {
    driver: Driver,
    dsn: String,
    pool: RwLock<Pool>,
    reconnect: Mutex<()>,
}

impl Db {
    pub async fn connect(driver: &str, dsn: &str) -> Result<Self, DbError> {
        let driver = Driver::from_name(driver)?;
        let pool = open(driver, dsn).await.map_err(DbError::Connect)?;
        Ok(Self {
            driver,
            dsn: dsn.to_string(),
            pool: RwLock::new(pool),
            reconnect: Mutex::new(()),
        })
    }

    /// Run the fixed descriptor lookup: two positional inputs (action,
    /// method), two outputs (template text, nullable auth flag). The shape
    /// of this call is the integration contract with the external store.
    pub async fn lookup_descriptor(
        &self,
        query: &str,
        action: &str,
        method: &str,
    ) -> Result<Option<ActionDescriptor>, DbError> {
        let pool = self.pool.read().await.clone();
        let found = match pool {
            Pool::Postgres(p) => sqlx::query(query)
                .bind(action)
                .bind(method)
                .fetch_optional(&p)
                .await
                .map_err(DbError::Query)?
                .map(|row| descriptor_from_pg(&row))
                .transpose()?,
            Pool::MySql(p) => sqlx::query(query)
                .bind(action)
                .bind(method)
                .fetch_optional(&p)
                .await
                .map_err(DbError::Query)?
                .map(|row| descriptor_from_mysql(&row))
                .transpose()?,
            Pool::Sqlite(p) => sqlx::query(query)
                .bind(action)
                .bind(method)
                .fetch_optional(&p)
                .await
                .map_err(DbError::Query)?
                .map(|row| descriptor_from_sqlite(&row))
                .transpose()?,
        };
        Ok(found)
    }

    /// Execute a rendered query and stream the rows through the normalizer.
    /// A row that fails to decode is logged and dropped; a connection-level
    /// error aborts the whole fetch.
    pub async fn fetch(&self, sql: &str) -> Result<Vec<ResultRow>, DbError> {
        let pool = self.pool.read().await.clone();
        let mut out = Vec::new();
        match pool {
            Pool::Postgres(p) => {
                let mut rows = sqlx::query(sql).fetch(&p);
                while let Some(row) = rows.try_next().await.map_err(DbError::Query)? {
                    push_row(&mut out, normalize::postgres_row(&row));
                }
            }
            Pool::MySql(p) => {
                let mut rows = sqlx::query(sql).fetch(&p);
                while let Some(row) = rows.try_next().await.map_err(DbError::Query)? {
                    push_row(&mut out, normalize::mysql_row(&row));
                }
            }
            Pool::Sqlite(p) => {
                let mut rows = sqlx::query(sql).fetch(&p);
                while let Some(row) = rows.try_next().await.map_err(DbError::Query)? {
                    push_row(&mut out, normalize::sqlite_row(&row));
                }
            }
        }
        Ok(out)
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let pool = self.pool.read().await.clone();
        match pool {
            Pool::Postgres(p) => sqlx::query("SELECT 1").execute(&p).await.map(|_| ()),
            Pool::MySql(p) => sqlx::query("SELECT 1").execute(&p).await.map(|_| ()),
            Pool::Sqlite(p) => sqlx::query("SELECT 1").execute(&p).await.map(|_| ()),
        }
    }

    /// Periodically health-check the store; on failure run a serialized
    /// reconnect sequence. Exhausting the retry budget is fatal to the
    /// process — the dispatcher does not degrade without its store.
    pub fn spawn_watchdog(self: Arc<Self>) {
        let db = self;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;
                if let Err(e) = db.ping().await {
                    tracing::warn!(error = %e, "database connection lost, reconnecting");
                    db.reconnect().await;
                }
            }
        });
    }

    async fn reconnect(&self) {
        let _serialized = self.reconnect.lock().await;
        if self.ping().await.is_ok() {
            // Another sequence already restored the pool.
            return;
        }
        // Hold the write lock for the whole sequence: in-flight and new
        // requests block on query execution until the store is back.
        let mut pool = self.pool.write().await;
        for attempt in 1..=RECONNECT_ATTEMPTS {
            match open(self.driver, &self.dsn).await {
                Ok(fresh) => {
                    *pool = fresh;
                    tracing::info!(attempt, "database reconnected");
                    return;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                }
            }
        }
        tracing::error!("database unreachable after {RECONNECT_ATTEMPTS} attempts, exiting");
        std::process::exit(1);
    }
}

fn push_row(out: &mut Vec<ResultRow>, normalized: Result<ResultRow, sqlx::Error>) {
    match normalized {
        Ok(row) => out.push(row),
        Err(e) => tracing::warn!(error = %e, "dropping row that failed to decode"),
    }
}

// ---------------------------------------------------------------------------
// Descriptor extraction — the auth flag's integer width varies by schema
// ---------------------------------------------------------------------------

fn descriptor_from_pg(row: &PgRow) -> Result<ActionDescriptor, DbError> {
    let template: Option<String> = row.try_get(0).map_err(DbError::Query)?;
    let auth = if let Ok(v) = row.try_get::<Option<i64>, _>(1) {
        v
    } else if let Ok(v) = row.try_get::<Option<i32>, _>(1) {
        v.map(i64::from)
    } else {
        row.try_get::<Option<i16>, _>(1)
            .map_err(DbError::Query)?
            .map(i64::from)
    };
    Ok(ActionDescriptor::new(template.unwrap_or_default(), auth))
}

fn descriptor_from_mysql(row: &MySqlRow) -> Result<ActionDescriptor, DbError> {
    let template: Option<String> = row.try_get(0).map_err(DbError::Query)?;
    let auth = if let Ok(v) = row.try_get::<Option<i64>, _>(1) {
        v
    } else if let Ok(v) = row.try_get::<Option<i32>, _>(1) {
        v.map(i64::from)
    } else {
        row.try_get::<Option<i8>, _>(1)
            .map_err(DbError::Query)?
            .map(i64::from)
    };
    Ok(ActionDescriptor::new(template.unwrap_or_default(), auth))
}

fn descriptor_from_sqlite(row: &SqliteRow) -> Result<ActionDescriptor, DbError> {
    let template: Option<String> = row.try_get(0).map_err(DbError::Query)?;
    let auth: Option<i64> = row.try_get(1).map_err(DbError::Query)?;
    Ok(ActionDescriptor::new(template.unwrap_or_default(), auth))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
