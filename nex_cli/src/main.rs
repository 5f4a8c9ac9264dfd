use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};

use nex_collector::{ExporterConfig, LogFormat, ServerConfig, ServerLabel};

mod commands;

#[derive(Parser)]
#[command(name = "nex-exporter")]
#[command(about = "Prometheus exporter for NATS server monitoring endpoints", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "dev")]
    log_format: LogFormatArg,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve metrics over HTTP (default)
    Run(ExporterArgs),

    /// Scrape every endpoint once and print the exposition
    Scrape {
        #[command(flatten)]
        exporter: ExporterArgs,

        /// Print samples as JSON instead of the text format
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate an example configuration
    Generate {
        /// Output file
        #[arg(short, long, default_value = "nex.yaml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the effective configuration
    Show(ExporterArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Dev,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Dev => LogFormat::Dev,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ServerLabelArg {
    Configured,
    ServerId,
    ServerName,
}

impl From<ServerLabelArg> for ServerLabel {
    fn from(arg: ServerLabelArg) -> Self {
        match arg {
            ServerLabelArg::Configured => ServerLabel::Configured,
            ServerLabelArg::ServerId => ServerLabel::ServerId,
            ServerLabelArg::ServerName => ServerLabel::ServerName,
        }
    }
}

/// Settings shared by `run`, `scrape` and `config show`; flags override the file
#[derive(Args, Default)]
struct ExporterArgs {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exposition listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Monitored server as `id=url` or `url` (repeatable)
    #[arg(short, long = "server")]
    servers: Vec<String>,

    /// Endpoint to scrape, e.g. varz, connz, healthz, jsz (repeatable)
    #[arg(short, long = "endpoint")]
    endpoints: Vec<String>,

    /// Replaces the system segment of every metric name
    #[arg(short, long)]
    prefix: Option<String>,

    /// Per-fetch timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// HTTP path of the exposition
    #[arg(long)]
    metrics_path: Option<String>,

    /// Source of the server_id label
    #[arg(long, value_enum)]
    server_label: Option<ServerLabelArg>,
}

impl ExporterArgs {
    /// Load the config file, if any, and apply flag overrides
    fn into_config(self) -> Result<ExporterConfig> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::read_yaml_file(path)?,
            None => ExporterConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if !self.servers.is_empty() {
            config.servers = self
                .servers
                .iter()
                .map(|spec| ServerConfig::parse(spec))
                .collect::<Result<_, _>>()?;
        }
        if !self.endpoints.is_empty() {
            config.endpoints = self.endpoints;
        }
        if let Some(prefix) = self.prefix {
            config.metric_prefix = prefix;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(path) = self.metrics_path {
            config.metrics_path = path;
        }
        if let Some(label) = self.server_label {
            config.server_label = label.into();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    nex_collector::init_logging(cli.log_format.into());

    match cli.command.unwrap_or_else(|| Commands::Run(ExporterArgs::default())) {
        Commands::Run(args) => {
            commands::run::run(args.into_config()?).await?;
        }
        Commands::Scrape { exporter, json } => {
            commands::scrape::run(exporter.into_config()?, json).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Generate { output } => {
                commands::config::generate(&output)?;
            }
            ConfigAction::Validate { file } => {
                commands::config::validate(&file)?;
            }
            ConfigAction::Show(args) => {
                commands::config::show(&args.into_config()?)?;
            }
        },
    }

    Ok(())
}
