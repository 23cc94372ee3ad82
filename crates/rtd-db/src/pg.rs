//! Postgres-backed [`DomainStore`].
//!
//! Filters and patches are rendered with `sqlx::QueryBuilder` so every value
//! is a bind parameter. Claims use `FOR UPDATE SKIP LOCKED` so two replicas
//! racing for the same phase never receive the same row.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rtd_schemas::{lock_sentinel, DomainPhase, DomainState, NewRuntimeDomain, RuntimeDomain};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::store::{DomainFilter, DomainPatch, DomainStore};

const COLUMNS: &str =
    "id, app_id, domain, state, phase, locked_at, created_at_utc, updated_at_utc";

#[derive(Clone)]
pub struct PgDomainStore {
    pool: PgPool,
}

impl PgDomainStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_domain(row: &PgRow) -> Result<RuntimeDomain> {
    Ok(RuntimeDomain {
        id: row.try_get("id")?,
        app_id: row.try_get("app_id")?,
        domain: row.try_get("domain")?,
        state: DomainState::parse(&row.try_get::<String, _>("state")?)?,
        phase: DomainPhase::parse(&row.try_get::<String, _>("phase")?)?,
        locked_at: row.try_get("locked_at")?,
        created_at_utc: row.try_get("created_at_utc")?,
        updated_at_utc: row.try_get("updated_at_utc")?,
    })
}

/// Append ` and <predicate>` for each populated filter field.
fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &DomainFilter) {
    if let Some(id) = f.id {
        qb.push(" and id = ").push_bind(id);
    }
    if let Some(app_id) = &f.app_id {
        qb.push(" and app_id = ").push_bind(app_id.clone());
    }
    if let Some(state) = f.state {
        qb.push(" and state = ").push_bind(state.as_str());
    }
    if let Some(phase) = f.phase {
        qb.push(" and phase = ").push_bind(phase.as_str());
    }
    if let Some(cutoff) = f.locked_before {
        qb.push(" and locked_at < ").push_bind(cutoff);
    }
}

/// Restrict to rows the patch would actually change, so `rows_affected`
/// counts modifications rather than matches.
fn push_changes_guard(qb: &mut QueryBuilder<'_, Postgres>, p: &DomainPatch) {
    let mut open = false;
    if let Some(phase) = p.phase {
        qb.push(" and (phase <> ").push_bind(phase.as_str());
        open = true;
    }
    if let Some(at) = p.locked_at {
        qb.push(if open { " or locked_at <> " } else { " and (locked_at <> " })
            .push_bind(at);
        open = true;
    }
    if open {
        qb.push(")");
    }
}

fn push_set(qb: &mut QueryBuilder<'_, Postgres>, p: &DomainPatch) {
    qb.push("update runtime_domains set updated_at_utc = now()");
    if let Some(phase) = p.phase {
        qb.push(", phase = ").push_bind(phase.as_str());
    }
    if let Some(at) = p.locked_at {
        qb.push(", locked_at = ").push_bind(at);
    }
}

#[async_trait]
impl DomainStore for PgDomainStore {
    async fn claim_one(
        &self,
        filter: &DomainFilter,
        locked_at: DateTime<Utc>,
    ) -> Result<Option<RuntimeDomain>> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("with target as (select id, locked_at as prior_locked_at from runtime_domains where true");
        push_filter(&mut qb, filter);
        qb.push(" order by locked_at, id limit 1 for update skip locked) ");
        qb.push("update runtime_domains d set locked_at = ")
            .push_bind(locked_at);
        qb.push(
            " from target where d.id = target.id \
             returning d.id, d.app_id, d.domain, d.state, d.phase, \
             target.prior_locked_at as locked_at, d.created_at_utc, d.updated_at_utc",
        );

        let row = qb
            .build()
            .fetch_optional(&self.pool)
            .await
            .context("claim_one failed")?;

        row.as_ref().map(row_to_domain).transpose()
    }

    async fn update_one(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::new("");
        push_set(&mut qb, patch);
        qb.push(" where id = (select id from runtime_domains where true");
        push_filter(&mut qb, filter);
        push_changes_guard(&mut qb, patch);
        qb.push(" order by created_at_utc, id limit 1 for update)");

        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .context("update_one failed")?;
        Ok(res.rows_affected())
    }

    async fn update_many(&self, filter: &DomainFilter, patch: &DomainPatch) -> Result<u64> {
        if patch.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::new("");
        push_set(&mut qb, patch);
        qb.push(" where true");
        push_filter(&mut qb, filter);
        push_changes_guard(&mut qb, patch);

        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .context("update_many failed")?;
        Ok(res.rows_affected())
    }

    async fn delete_many(&self, filter: &DomainFilter) -> Result<u64> {
        let mut qb = QueryBuilder::new("delete from runtime_domains where true");
        push_filter(&mut qb, filter);

        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .context("delete_many failed")?;
        Ok(res.rows_affected())
    }

    async fn insert(&self, new: &NewRuntimeDomain) -> Result<RuntimeDomain> {
        let sql = format!(
            "insert into runtime_domains (id, app_id, domain, state, phase, locked_at) \
             values ($1, $2, $3, $4, $5, $6) returning {COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.app_id)
            .bind(&new.domain)
            .bind(new.state.as_str())
            .bind(new.phase.as_str())
            .bind(lock_sentinel())
            .fetch_one(&self.pool)
            .await
            .context("insert runtime domain failed")?;
        row_to_domain(&row)
    }

    async fn list(&self, filter: &DomainFilter) -> Result<Vec<RuntimeDomain>> {
        let mut qb = QueryBuilder::new(format!("select {COLUMNS} from runtime_domains where true"));
        push_filter(&mut qb, filter);
        qb.push(" order by created_at_utc, id");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("list runtime domains failed")?;
        rows.iter().map(row_to_domain).collect()
    }
}
