use chrono::NaiveDate;
use std::path::PathBuf;

pub const ENV_WORKSPACE: &str = "STUDIOD_WORKSPACE";
pub const ENV_TODAY: &str = "STUDIOD_TODAY";
pub const ENV_LOG: &str = "STUDIOD_LOG";

/// Sidecar settings.
///
/// Flags take precedence over environment variables:
/// - `--workspace=PATH` / `STUDIOD_WORKSPACE`: workspace to open at start-up
/// - `--today=YYYY-MM-DD` / `STUDIOD_TODAY`: pin "today" for every view
/// - `--log=FILTER` / `STUDIOD_LOG`: tracing filter, default `info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub today: Option<NaiveDate>,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            today: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_args_and_env(args: &[String]) -> anyhow::Result<Self> {
        Self::from_sources(args, |key| std::env::var(key).ok())
    }

    fn from_sources<F>(args: &[String], env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(v) = env(ENV_WORKSPACE).filter(|v| !v.trim().is_empty()) {
            config.workspace = Some(PathBuf::from(v));
        }
        if let Some(v) = env(ENV_TODAY).filter(|v| !v.trim().is_empty()) {
            config.today = Some(parse_day(&v)?);
        }
        if let Some(v) = env(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            config.log_filter = v;
        }

        for arg in args {
            if let Some(val) = arg.strip_prefix("--workspace=") {
                config.workspace = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--today=") {
                config.today = Some(parse_day(val)?);
            } else if let Some(val) = arg.strip_prefix("--log=") {
                config.log_filter = val.to_string();
            }
        }

        Ok(config)
    }

    /// The pinned day if any, otherwise the local calendar date.
    pub fn today(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

fn parse_day(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid date {:?}: {}", raw, e))
}
