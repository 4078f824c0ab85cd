use std::{net::IpAddr, path::PathBuf};

use clap::{Parser, ValueEnum};
use rocket::{data::ByteUnit, figment::Figment};

const DEFAULT_DB_FILE: &str = "webhooks.db";
/// The only writable location on read-only serverless hosts.
const SERVERLESS_DB_PATH: &str = "/tmp/webhooks.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Capture and inspect webhook deliveries.
#[derive(Debug, Clone, Parser)]
#[command(name = "webhook-inspector", version)]
pub struct Config {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3010)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: IpAddr,

    /// Set on serverless hosts; the database then lives under /tmp.
    #[arg(long, env = "VERCEL")]
    pub vercel: Option<String>,

    /// Explicit database file. Takes precedence over --vercel.
    #[arg(long, env = "WEBHOOK_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Directory holding the inspector UI.
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,

    /// Largest webhook body captured, in bytes. Longer bodies are truncated.
    #[arg(long, env = "BODY_LIMIT", default_value_t = 1024 * 1024)]
    pub body_limit: u64,

    /// Log level (trace, debug, info, warn, error, off).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

impl Config {
    pub fn database_path(&self) -> PathBuf {
        match (&self.db_path, &self.vercel) {
            (Some(path), _) => path.clone(),
            (None, Some(_)) => PathBuf::from(SERVERLESS_DB_PATH),
            (None, None) => PathBuf::from(DEFAULT_DB_FILE),
        }
    }

    pub fn body_limit(&self) -> ByteUnit {
        ByteUnit::from(self.body_limit)
    }

    /// Rocket's own configuration with our listen settings merged on top.
    /// Rocket's logger is switched off; `tracing` owns the output.
    pub fn figment(&self) -> Figment {
        rocket::Config::figment()
            .merge(("port", self.port))
            .merge(("address", self.address))
            .merge(("log_level", "off"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("webhook-inspector").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    fn with_db(db_path: Option<&str>, vercel: Option<&str>) -> Config {
        Config {
            port: 3010,
            address: IpAddr::from([127, 0, 0, 1]),
            vercel: vercel.map(str::to_owned),
            db_path: db_path.map(PathBuf::from),
            static_dir: PathBuf::from("public"),
            body_limit: 1024,
            log_level: "info".to_owned(),
            log_format: LogFormat::Pretty,
        }
    }

    #[test]
    fn db_path_follows_serverless_flag() {
        assert_eq!(with_db(None, None).database_path(), PathBuf::from("webhooks.db"));
        assert_eq!(
            with_db(None, Some("1")).database_path(),
            PathBuf::from("/tmp/webhooks.db")
        );
        assert_eq!(
            with_db(Some("data/hooks.db"), None).database_path(),
            PathBuf::from("data/hooks.db")
        );
        assert_eq!(
            with_db(Some("mine.db"), Some("1")).database_path(),
            PathBuf::from("mine.db")
        );
    }

    #[test]
    fn db_path_flags_parse() {
        let config = parse(&["--db-path", "data/hooks.db", "--vercel", "1"]);
        assert_eq!(config.db_path, Some(PathBuf::from("data/hooks.db")));
        assert_eq!(config.vercel.as_deref(), Some("1"));
    }

    #[test]
    fn figment_carries_listen_settings() {
        let config = parse(&["--port", "8080", "--address", "127.0.0.1"]);
        let rocket_config: rocket::Config = config.figment().extract().unwrap();
        assert_eq!(rocket_config.port, 8080);
        assert_eq!(rocket_config.address, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(rocket_config.log_level, rocket::config::LogLevel::Off);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = Config::try_parse_from(["webhook-inspector", "--port", "not-a-port"]);
        assert!(err.is_err());
    }

    #[test]
    fn log_format_parses() {
        assert_eq!(parse(&["--log-format", "json"]).log_format, LogFormat::Json);
        assert_eq!(parse(&["--body-limit", "16"]).body_limit(), ByteUnit::from(16u64));
    }
}
