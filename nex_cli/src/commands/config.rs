use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use tabled::{Table, Tabled};

use nex_collector::{ExporterConfig, ServerLabel};

#[derive(Tabled)]
struct ServerRow {
    #[tabled(rename = "server_id")]
    id: String,
    url: String,
}

pub fn generate(output: &Path) -> Result<()> {
    println!("{}", "Generating example configuration...".bold());

    let config = ExporterConfig::builder()
        .server("local", "http://127.0.0.1:8222")
        .endpoint("varz")
        .endpoint("connz")
        .endpoint("healthz")
        .build();
    config.to_yaml_file(output)?;

    println!("{} {}", "✓ Configuration saved to:".green(), output.display().to_string().cyan());
    Ok(())
}

pub fn validate(file: &Path) -> Result<()> {
    println!("{} {}", "Validating configuration:".bold(), file.display().to_string().cyan());

    match ExporterConfig::from_yaml_file(file) {
        Ok(config) => {
            println!(
                "{} Configuration is valid ({} servers, {} endpoints)",
                "✓".green(),
                config.servers.len(),
                config.endpoints.len()
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            anyhow::bail!("Configuration validation failed");
        }
    }
}

pub fn show(config: &ExporterConfig) -> Result<()> {
    println!("{}", "Effective Configuration".bold().green());
    println!("{}", "=".repeat(50));

    println!("Listen Address: {}", config.listen_addr.to_string().cyan());
    println!("Metrics Path: {}", config.metrics_path.cyan());
    println!("Fetch Timeout: {} ms", config.timeout_ms.to_string().yellow());
    println!(
        "Metric Prefix: {}",
        if config.metric_prefix.is_empty() {
            "(system default)".dimmed()
        } else {
            config.metric_prefix.yellow()
        }
    );
    let label = match config.server_label {
        ServerLabel::Configured => "configured id",
        ServerLabel::ServerId => "varz server_id",
        ServerLabel::ServerName => "varz server_name",
    };
    println!("Server Label: {}", label.yellow());
    println!("Endpoints: {}", config.endpoints.join(", ").cyan());
    println!();

    let rows: Vec<ServerRow> = config
        .collected_servers()
        .into_iter()
        .map(|server| ServerRow {
            id: server.id,
            url: server.url,
        })
        .collect();
    println!("{}", Table::new(rows));

    Ok(())
}
