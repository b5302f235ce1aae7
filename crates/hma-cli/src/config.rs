use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use hma_core::{parse_timezone, ClockError, LocalZone, DEFAULT_MARKET_TIMEZONE};
use hma_notify::{parse_recipients, EmailSettings, SmtpSettings, DEFAULT_SMTP_PORT};
use hma_vision::{VisionClientConfig, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_STORAGE_DIR: &str = "./data";
pub const DEFAULT_IMAGE_PATH: &str = "sp500_heatmap.png";
pub const DEFAULT_MAX_PREVIOUS: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid timezone: {0}")]
    Timezone(#[from] ClockError),
    #[error("cannot read image {}: {source}", .path.display())]
    ImageUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Parser, Debug)]
#[command(name = "hma")]
#[command(about = "S&P 500 heat map analyst", long_about = None)]
pub struct Cli {
    /// Log at debug level regardless of HMA_LOG_LEVEL
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze the captured heat map, store the result and optionally email it
    Analyze(AnalyzeArgs),
    /// Crop a full-page screenshot down to the heat map bounding box
    Crop(CropArgs),
    /// List the most recent stored analyses
    History(HistoryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long, env = "API_ENDPOINT")]
    pub api_endpoint: Option<String>,
    #[arg(long, env = "API_MODEL", default_value = DEFAULT_MODEL)]
    pub api_model: String,
    #[arg(long, env = "API_TIMEOUT_SECS")]
    pub api_timeout_secs: Option<u64>,
    #[arg(long, env = "IMAGE_PATH")]
    pub image_path: Option<PathBuf>,
    #[arg(long, env = "STORAGE_DIR", default_value = DEFAULT_STORAGE_DIR)]
    pub storage_dir: PathBuf,
    #[arg(long, env = "MAX_PREVIOUS", default_value_t = DEFAULT_MAX_PREVIOUS)]
    pub max_previous: usize,
    #[arg(long, env = "LOCAL_TIMEZONE")]
    pub local_timezone: Option<String>,
    #[arg(long, env = "MARKET_TIMEZONE", default_value = DEFAULT_MARKET_TIMEZONE)]
    pub market_timezone: String,
    #[command(flatten)]
    pub email: EmailArgs,
    /// Accepted for compatibility; reports are rendered from built-in layouts.
    #[arg(long, env = "TEMPLATES_DIR", default_value = "./templates")]
    pub templates_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct EmailArgs {
    #[arg(long, env = "EMAIL_ENABLED", default_value = "false")]
    pub email_enabled: String,
    #[arg(long, env = "EMAIL_SENDER")]
    pub email_sender: Option<String>,
    #[arg(long, env = "EMAIL_RECIPIENTS")]
    pub email_recipients: Option<String>,
    #[arg(long, env = "SMTP_SERVER")]
    pub smtp_server: Option<String>,
    #[arg(long, env = "SMTP_PORT", default_value_t = DEFAULT_SMTP_PORT)]
    pub smtp_port: u16,
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,
    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CropArgs {
    /// Full-viewport screenshot produced by the browser driver
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub x: u32,
    #[arg(long)]
    pub y: u32,
    #[arg(long)]
    pub width: u32,
    #[arg(long)]
    pub height: u32,
    #[arg(long, env = "IMAGE_PATH", default_value = DEFAULT_IMAGE_PATH)]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    #[arg(long, env = "STORAGE_DIR", default_value = DEFAULT_STORAGE_DIR)]
    pub storage_dir: PathBuf,
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

pub fn flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Everything one analysis run needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub vision: VisionClientConfig,
    pub image_path: PathBuf,
    pub storage_dir: PathBuf,
    pub max_previous: usize,
    pub local_zone: LocalZone,
    pub market_zone: Tz,
    pub email: EmailSettings,
    pub templates_dir: PathBuf,
}

impl Settings {
    pub fn from_args(args: AnalyzeArgs) -> Result<Self, ConfigError> {
        let api_key = required(args.api_key, "API_KEY")?;
        let endpoint = required(args.api_endpoint, "API_ENDPOINT")?;
        let image_path = args
            .image_path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ConfigError::Missing("IMAGE_PATH"))?;

        let vision = VisionClientConfig {
            endpoint,
            api_key,
            model: args.api_model,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: args.api_timeout_secs.map(Duration::from_secs),
        };

        let email = EmailSettings {
            enabled: flag_enabled(&args.email.email_enabled),
            sender: args.email.email_sender.unwrap_or_default(),
            recipients: parse_recipients(&args.email.email_recipients.unwrap_or_default()),
            smtp: SmtpSettings {
                server: args.email.smtp_server.unwrap_or_default(),
                port: args.email.smtp_port,
                username: args.email.smtp_username.unwrap_or_default(),
                password: args.email.smtp_password.unwrap_or_default(),
            },
        };

        Ok(Self {
            vision,
            image_path,
            storage_dir: args.storage_dir,
            max_previous: args.max_previous,
            local_zone: LocalZone::from_name(args.local_timezone.as_deref())?,
            market_zone: parse_timezone(&args.market_timezone)?,
            email,
            templates_dir: args.templates_dir,
        })
    }
}
