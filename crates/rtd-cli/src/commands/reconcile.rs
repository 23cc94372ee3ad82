use anyhow::{Context, Result};
use rtd_config::{ConfigConsumer, UnusedKeyPolicy};

/// One tick with the production collaborators. Config is validated before
/// the database is touched.
pub async fn tick_once(config_paths: &[String]) -> Result<()> {
    let loaded = super::load_config(config_paths)?;
    let unused = rtd_config::report_unused_keys(
        ConfigConsumer::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        tracing::warn!(keys = ?unused.unused_leaf_pointers, "config keys ignored by the CLI");
    }

    let store = super::open_store().await?;
    let reconciler = rtd_reconcile::reconciler_from_config(&loaded.config_json, store)?;
    let report = reconciler.tick().await;

    let out = serde_json::json!({
        "config_hash": loaded.config_hash,
        "report": report,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&out).context("serialize tick report")?
    );
    Ok(())
}
