use std::time::Duration;

use crate::error::{AppError, Result};

pub mod query;
pub mod validator;

pub use query::{Limit, QueryParams};

pub const DEFAULT_BASE_URL: &str = "https://iss.moex.com/iss";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const PASSPORT_COOKIE: &str = "MicexPassportCert";

/// Blocks read from a response unless the caller configures otherwise.
pub const DEFAULT_BLOCKS: &[&str] = &[
    "securities",
    "marketdata",
    "marketdata_yields",
    "history",
    "coupons",
];

/// How the fan-out layer treats a branch that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanOutPolicy {
    /// The failed branch is logged and contributes an empty dataset.
    #[default]
    BestEffort,
    /// The first failure in identifier order is returned to the caller.
    FailFast,
}

impl FanOutPolicy {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" | "besteffort" => Ok(FanOutPolicy::BestEffort),
            "fail-fast" | "fail_fast" | "failfast" => Ok(FanOutPolicy::FailFast),
            other => Err(AppError::configuration(format!(
                "unknown fan-out policy `{other}`, expected `best-effort` or `fail-fast`"
            ))),
        }
    }
}

/// Settings used to build the shared HTTP session and drive fan-out.
#[derive(Debug, Clone)]
pub struct IssConfig {
    pub base_url: String,
    pub proxy_url: Option<String>,
    /// Value of the passport cookie obtained by an external login step.
    pub passport: Option<String>,
    pub timeout: Duration,
    /// `None` lets every fan-out branch be in flight at once.
    pub concurrency_limit: Option<usize>,
    pub fan_out: FanOutPolicy,
    pub blocks: Vec<String>,
}

impl IssConfig {
    pub fn builtin() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy_url: None,
            passport: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency_limit: None,
            fan_out: FanOutPolicy::default(),
            blocks: DEFAULT_BLOCKS.iter().map(|name| name.to_string()).collect(),
        }
    }

    /// Builtin defaults overridden by `ISS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::builtin();
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = non_empty("ISS_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        config.proxy_url = non_empty("ISS_PROXY_URL");
        config.passport = non_empty("ISS_PASSPORT");

        if let Some(raw) = non_empty("ISS_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AppError::configuration(format!("ISS_TIMEOUT_SECS must be an integer, got `{raw}`"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = non_empty("ISS_CONCURRENCY") {
            let limit: usize = raw.trim().parse().map_err(|_| {
                AppError::configuration(format!("ISS_CONCURRENCY must be an integer, got `{raw}`"))
            })?;
            config.concurrency_limit = Some(limit);
        }

        if let Some(raw) = non_empty("ISS_FAN_OUT") {
            config.fan_out = FanOutPolicy::parse(&raw)?;
        }

        validator::validate(&config)?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_fan_out(mut self, policy: FanOutPolicy) -> Self {
        self.fan_out = policy;
        self
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }
}

impl Default for IssConfig {
    fn default() -> Self {
        Self::builtin()
    }
}
