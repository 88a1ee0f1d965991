use crate::client::{DEFAULT_CHAT_PATH, ResponseOrdering};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Prefix for environment overrides, e.g. `CHAT_WIDGET__SERVER__PORT=8080`.
pub const ENV_PREFIX: &str = "CHAT_WIDGET";

/// Config file picked up from the working directory when none is given.
const CWD_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Base URL of the chat backend
    #[arg(long, env = "CHAT_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Only render the reply to the most recent message
    #[arg(long, env = "LATEST_ONLY")]
    pub latest_only: Option<bool>,

    /// Log output format (compact or json)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub widget: WidgetConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub chat_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WidgetConfig {
    pub ordering: ResponseOrdering,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        // 1. Defaults
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("backend.base_url", "http://127.0.0.1:8000")?
            .set_default("backend.chat_path", DEFAULT_CHAT_PATH)?
            .set_default("widget.ordering", ResponseOrdering::Arrival.as_str())?
            .set_default("telemetry.log_format", LogFormat::Compact.as_str())?;

        // 2. Config file: explicit path, else ./config.yaml if present
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path));
        } else if Path::new(CWD_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(CWD_CONFIG_FILE));
        }

        // 3. Prefixed environment, e.g. CHAT_WIDGET__BACKEND__BASE_URL
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        // 4. CLI flags (and their unprefixed env aliases) win
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(url) = cli.backend_url {
            builder = builder.set_override("backend.base_url", url)?;
        }
        if let Some(latest_only) = cli.latest_only {
            let ordering = if latest_only {
                ResponseOrdering::LatestOnly
            } else {
                ResponseOrdering::Arrival
            };
            builder = builder.set_override("widget.ordering", ordering.as_str())?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("telemetry.log_format", format.as_str())?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "backend.base_url cannot be empty".to_string(),
            ));
        }
        if !self.backend.chat_path.starts_with('/') {
            return Err(config::ConfigError::Message(format!(
                "backend.chat_path must start with '/': {}",
                self.backend.chat_path
            )));
        }
        Ok(())
    }

    /// `host:port` to bind the widget server to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
