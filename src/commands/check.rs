// ABOUTME: Check command implementation.
// ABOUTME: Reports component health, available updates, or the integrity of one bundle.

use super::runtime_connection::connect;
use bulwark::config::Config;
use bulwark::error::{Error, Result};
use bulwark::output::Output;
use bulwark::runtime::ComponentHealth;
use bulwark::snapshot::{SnapshotCatalog, Validation};
use bulwark::types::BundleId;

pub async fn check(config: Config, output: Output, updates: bool, bundle: Option<&str>) -> Result<()> {
    if let Some(raw) = bundle {
        return check_bundle(&config, &output, raw);
    }

    let ctx = connect(config, &output).await?;

    if updates {
        let available = ctx.orchestrator()?.check_updates().await?;
        let human = available
            .iter()
            .map(|u| {
                if u.is_available() {
                    format!("{:<20} {} -> {}", u.component, u.current.short(), u.latest.short())
                } else {
                    format!("{:<20} up to date", u.component)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let rows: Vec<_> = available
            .iter()
            .map(|u| {
                serde_json::json!({
                    "component": u.component,
                    "current": u.current,
                    "latest": u.latest,
                    "available": u.is_available(),
                })
            })
            .collect();
        output.data(&rows, &human);

        let count = available.iter().filter(|u| u.is_available()).count();
        output.success(&format!("{} update(s) available", count));
        return Ok(());
    }

    let report = ctx.health().report(&ctx.components()).await;
    let human = report
        .iter()
        .map(|(component, health)| format!("{:<20} {}", component, health))
        .collect::<Vec<_>>()
        .join("\n");
    let rows: Vec<_> = report
        .iter()
        .map(|(component, health)| serde_json::json!({ "component": component, "health": health }))
        .collect();
    output.data(&rows, &human);

    let unhealthy: Vec<&str> = report
        .iter()
        .filter(|(_, health)| *health != ComponentHealth::Healthy)
        .map(|(component, _)| component.as_str())
        .collect();
    if !unhealthy.is_empty() {
        return Err(Error::NotHealthy(unhealthy.join(", ")));
    }
    output.success("All components healthy");
    Ok(())
}

fn check_bundle(config: &Config, output: &Output, raw: &str) -> Result<()> {
    let id = BundleId::parse(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    let catalog = SnapshotCatalog::new(&config.catalog.dir);

    match catalog.verify_checksums(&id) {
        Validation::Valid => {
            output.success(&format!("{} is valid", id));
            Ok(())
        }
        Validation::Invalid(reasons) => Err(Error::BundleInvalid {
            id: id.to_string(),
            reasons: reasons.join("; "),
        }),
    }
}
