use anyhow::anyhow;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::config::LogFormat;

/// Installs the global subscriber. `RUST_LOG` directives, when present,
/// refine the configured level.
pub fn init(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(parse_level(level)?.into())
        .from_env_lossy();

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .pretty()
            .try_init(),
    }
    .map_err(|err| anyhow!("initialize logging subscriber: {err}"))
}

fn parse_level(raw: &str) -> anyhow::Result<LevelFilter> {
    raw.trim().to_ascii_lowercase().parse().map_err(|_| {
        anyhow!("invalid log level `{raw}`; expected one of trace, debug, info, warn, error, off")
    })
}
