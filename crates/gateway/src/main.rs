use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use unrelated_tool_gateway::settings::GatewaySettings;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file (YAML)
    #[arg(short, long, env = "UNRELATED_TOOL_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides the settings file)
    #[arg(long, env = "UNRELATED_TOOL_GATEWAY_BIND")]
    bind: Option<String>,

    /// Log filter directive, e.g. `info` or `unrelated_tool_gateway=debug`
    #[arg(long, env = "UNRELATED_TOOL_GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    #[arg(long, env = "UNRELATED_TOOL_GATEWAY_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(level: Option<&str>, format: LogFormat) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref(), args.log_format);

    let mut settings = match &args.config {
        Some(path) => GatewaySettings::load(path)?,
        None => GatewaySettings::default(),
    };
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }

    unrelated_tool_gateway::run(settings).await
}
