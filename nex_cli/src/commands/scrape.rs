use anyhow::Result;
use nex_collector::ExporterConfig;
use serde_json::json;

use super::build_registry;

pub async fn run(config: ExporterConfig, as_json: bool) -> Result<()> {
    let registry = build_registry(&config).await?;

    if !as_json {
        print!("{}", registry.render().await?);
        return Ok(());
    }

    let mut samples = Vec::new();
    for family in registry.gather().await {
        // Self-metrics are not broker samples
        if family.get_name().starts_with("nex_") {
            continue;
        }
        for metric in family.get_metric() {
            let labels: serde_json::Map<String, serde_json::Value> = metric
                .get_label()
                .iter()
                .map(|pair| (pair.get_name().to_string(), json!(pair.get_value())))
                .collect();
            samples.push(json!({
                "name": family.get_name(),
                "labels": labels,
                "value": metric.get_gauge().get_value(),
            }));
        }
    }

    println!("{}", serde_json::to_string_pretty(&samples)?);
    Ok(())
}
