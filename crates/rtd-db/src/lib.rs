//! rtd-db
//!
//! Persistence for runtime domains: the [`DomainStore`] contract plus the
//! Postgres and in-memory implementations.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod mem;
pub mod pg;
pub mod store;

pub use mem::MemDomainStore;
pub use pg::PgDomainStore;
pub use store::{DomainFilter, DomainPatch, DomainStore};

pub const ENV_DB_URL: &str = "RTD_DATABASE_URL";

/// Connect to Postgres using RTD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    tracing::info!("runtime_domains schema migrated");
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='runtime_domains'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_domains_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_domains_table: bool,
}
