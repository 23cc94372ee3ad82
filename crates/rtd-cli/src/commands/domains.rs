use anyhow::Result;
use rtd_db::DomainFilter;

pub async fn list(filter: &DomainFilter) -> Result<()> {
    let store = super::open_store().await?;
    let rows = store.list(filter).await?;

    for d in &rows {
        println!(
            "{} app={} domain={} state={} phase={} locked_at={}",
            d.id,
            d.app_id,
            d.domain,
            d.state.as_str(),
            d.phase.as_str(),
            d.locked_at.to_rfc3339()
        );
    }
    println!("count={}", rows.len());
    Ok(())
}
