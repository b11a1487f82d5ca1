use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub download: DownloadConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub statistics: StatisticsConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
}

impl Config {
    /// Resolve the profile for the selected environment.
    pub fn profile(&self, env: Environment) -> Option<&ProfileConfig> {
        match env {
            Environment::Local => self.profiles.local.as_ref(),
            Environment::Uat => self.profiles.uat.as_ref(),
            Environment::Prod => self.profiles.prod.as_ref(),
        }
    }
}

/// Download behavior: endpoint, credentials, timeouts, retry and validation
/// policy for individual file fetches.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Base URL of the file-serving API; file paths are appended verbatim.
    pub base_url: String,
    /// Application identifier sent with every request.
    pub app_id: String,
    /// Secret key sent with every request.
    pub api_key: String,
    /// User-Agent header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Maximum fetch attempts per file (including the first).
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Fixed delay between attempts in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u32,
    /// Delay between files of the same claim in seconds.
    #[serde(default = "default_inter_download_delay")]
    pub inter_download_delay_secs: u32,
    /// Delay between claims in seconds.
    #[serde(default = "default_inter_claim_delay")]
    pub inter_claim_delay_secs: u32,
    /// Outbound request ceiling per minute.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rpm: u32,
    /// Verify TLS certificates. Disabling downgrades certificate errors from
    /// fatal to ordinary network errors.
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Follow HTTP redirects.
    #[serde(default = "default_true")]
    pub follow_redirects: bool,
    /// Reject payloads smaller than this many bytes.
    #[serde(default = "default_min_file_size")]
    pub min_file_size_bytes: u64,
    /// Reject payloads larger than this many bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Check the payload's leading bytes for the PDF signature.
    #[serde(default = "default_true")]
    pub validate_pdf_format: bool,
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs as u64)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs as u64)
    }

    pub fn inter_download_delay(&self) -> Duration {
        Duration::from_secs(self.inter_download_delay_secs as u64)
    }

    pub fn inter_claim_delay(&self) -> Duration {
        Duration::from_secs(self.inter_claim_delay_secs as u64)
    }
}

fn default_user_agent() -> String {
    "claimfetch/0.1".to_string()
}

fn default_timeout() -> u32 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u32 {
    5
}

fn default_inter_download_delay() -> u32 {
    1
}

fn default_inter_claim_delay() -> u32 {
    2
}

fn default_rate_limit() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

fn default_min_file_size() -> u64 {
    1024
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

/// Scheduler periodicity. The components are summed, so `hours = 1,
/// minutes = 30` runs every 90 minutes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_periodicity_hours")]
    pub periodicity_hours: u32,
    #[serde(default)]
    pub periodicity_minutes: u32,
    #[serde(default)]
    pub periodicity_seconds: u32,
}

impl SchedulerConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(
            self.periodicity_hours as u64 * 3600
                + self.periodicity_minutes as u64 * 60
                + self.periodicity_seconds as u64,
        )
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            periodicity_hours: default_periodicity_hours(),
            periodicity_minutes: 0,
            periodicity_seconds: 0,
        }
    }
}

fn default_periodicity_hours() -> u32 {
    6
}

/// Cycle-level batching and failure policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CycleConfig {
    /// Outcomes accumulated before a commit to the store.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive all-failed claims tolerated before the cycle aborts.
    #[serde(default = "default_failure_threshold")]
    pub failure_alert_threshold: u32,
    /// When false, the first all-failed claim ends the cycle.
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    /// Rediscover previously failed files on later cycles.
    #[serde(default = "default_true")]
    pub retry_failed_downloads: bool,
    /// Cap on claims processed per cycle (0 = unlimited).
    #[serde(default)]
    pub max_claims_per_cycle: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            failure_alert_threshold: default_failure_threshold(),
            continue_on_error: true,
            retry_failed_downloads: true,
            max_claims_per_cycle: 0,
        }
    }
}

fn default_batch_size() -> usize {
    20
}

fn default_failure_threshold() -> u32 {
    5
}

/// Retention cleanup of old failure records.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cleanup_interval")]
    pub interval_hours: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours as u64 * 3600)
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: default_cleanup_interval(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_cleanup_interval() -> u32 {
    24
}

fn default_retention_days() -> u32 {
    30
}

/// Periodic statistics emission.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatisticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_statistics_interval")]
    pub interval_hours: u32,
    #[serde(default = "default_statistics_window")]
    pub window_hours: u32,
}

impl StatisticsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours as u64 * 3600)
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: default_statistics_interval(),
            window_hours: default_statistics_window(),
        }
    }
}

fn default_statistics_interval() -> u32 {
    1
}

fn default_statistics_window() -> u32 {
    24
}

/// Per-environment values: where the tracking database and downloaded
/// artifacts live.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileConfig {
    pub database_path: PathBuf,
    pub storage_root: PathBuf,
}

/// The set of known environment profiles.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProfilesConfig {
    #[serde(default)]
    pub local: Option<ProfileConfig>,
    #[serde(default)]
    pub uat: Option<ProfileConfig>,
    #[serde(default)]
    pub prod: Option<ProfileConfig>,
}

/// Environment selector for choosing a configuration profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Local,
    Uat,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Uat => "uat",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "uat" => Ok(Environment::Uat),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

/// Sanitized config for logs and diagnostics (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub base_url: String,
    pub app_id: String,
    pub api_key_configured: bool,
    pub scheduler_period_secs: u64,
    pub batch_size: usize,
    pub failure_alert_threshold: u32,
    pub rate_limit_rpm: u32,
    pub cleanup_enabled: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.download.base_url.clone(),
            app_id: config.download.app_id.clone(),
            api_key_configured: !config.download.api_key.is_empty(),
            scheduler_period_secs: config.scheduler.period().as_secs(),
            batch_size: config.cycle.batch_size,
            failure_alert_threshold: config.cycle.failure_alert_threshold,
            rate_limit_rpm: config.download.rate_limit_rpm,
            cleanup_enabled: config.cleanup.enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
[download]
base_url = "https://files.example.com/dms"
app_id = "claimfetch"
api_key = "secret"
"#
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(config.download.base_url, "https://files.example.com/dms");
        assert_eq!(config.download.timeout_secs, 60);
        assert_eq!(config.download.retry_attempts, 3);
        assert!(config.download.verify_tls);
        assert_eq!(config.cycle.batch_size, 20);
        assert_eq!(config.scheduler.period(), Duration::from_secs(6 * 3600));
    }

    #[test]
    fn test_deserialize_missing_download_fails() {
        let toml = r#"
[scheduler]
periodicity_hours = 1
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_scheduler_period_sums_components() {
        let toml = r#"
[download]
base_url = "https://files.example.com"
app_id = "a"
api_key = "k"

[scheduler]
periodicity_hours = 1
periodicity_minutes = 30
periodicity_seconds = 15
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.scheduler.period(), Duration::from_secs(5415));
    }

    #[test]
    fn test_profiles_resolution() {
        let toml = r#"
[download]
base_url = "https://files.example.com"
app_id = "a"
api_key = "k"

[profiles.local]
database_path = "claimfetch.db"
storage_root = "/tmp/claims"

[profiles.prod]
database_path = "/var/lib/claimfetch/claimfetch.db"
storage_root = "/srv/claims"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.profile(Environment::Local).is_some());
        assert!(config.profile(Environment::Uat).is_none());
        assert_eq!(
            config
                .profile(Environment::Prod)
                .unwrap()
                .storage_root
                .to_str()
                .unwrap(),
            "/srv/claims"
        );
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!("local".parse::<Environment>().unwrap(), Environment::Local);
        assert_eq!("UAT".parse::<Environment>().unwrap(), Environment::Uat);
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Prod
        );
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_sanitized_config_redacts_api_key() {
        let config: Config = toml::from_str(minimal_toml()).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.api_key_configured);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }
}
