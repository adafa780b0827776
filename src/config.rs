//! Configuration types for ontology-pull

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
///
/// Fields are organized into logical sub-configs:
/// - [`pull`](PullConfig) — which datasets are eligible and where restricted content comes from
/// - [`storage`](StorageConfig) — repository and temporary directories
/// - [`persistence`](PersistenceConfig) — database location
/// - [`fetch`](FetchConfig) — HTTP timeouts and retry policy
/// - [`parser`](ParserConfig) / [`annotator`](AnnotatorConfig) — external tools
/// - [`queue`](QueueConfig) — action queue namespace and claim semantics
/// - [`notifications`](NotificationConfig) — webhooks
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dataset eligibility and restricted content settings
    #[serde(default)]
    pub pull: PullConfig,

    /// File storage locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Data storage and state management
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Remote fetch behaviour
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Parsing oracle settings
    #[serde(default)]
    pub parser: ParserConfig,

    /// Annotator tool settings
    #[serde(default)]
    pub annotator: AnnotatorConfig,

    /// Action queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Notification settings (webhooks)
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// Which datasets the pull scheduler considers
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PullConfig {
    /// Allow automatic pulls of restricted (UMLS-backed) content (default: false)
    #[serde(default)]
    pub enable_restricted_auto_pull: bool,

    /// Base URL substituted for the pull location of restricted content
    ///
    /// The final location is this value followed by the last path segment of the
    /// recorded pull location, so it normally ends with a slash.
    #[serde(default)]
    pub alternate_base_url: Option<String>,

    /// Datasets that only run in long-run mode
    ///
    /// In long-run mode only these datasets are pulled; otherwise they are skipped.
    /// `None` disables the partition entirely.
    #[serde(default)]
    pub long_dataset_allow_list: Option<BTreeSet<String>>,

    /// Restrict the scan to these acronyms (debugging aid)
    #[serde(default)]
    pub restrict_to_dataset_ids: Option<BTreeSet<String>>,
}

/// File storage locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the versioned file repository (default: "./repository")
    #[serde(default = "default_repository_dir")]
    pub repository_dir: PathBuf,

    /// Directory for in-flight downloads (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repository_dir: default_repository_dir(),
            temp_dir: default_temp_dir(),
        }
    }
}

/// Data storage and state management
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./ontology-pull.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Remote fetch behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a single request, including body transfer (default: 300 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            user_agent: default_user_agent(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Parsing oracle settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Path to the parser executable (searched in PATH if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Arguments placed before the input/output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Maximum time a single parse may take (default: 1800 seconds)
    #[serde(default = "default_parser_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            extra_args: vec![],
            timeout: default_parser_timeout(),
        }
    }
}

/// Annotator tool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    /// Path to the annotator executable (searched in PATH if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Maximum time a single annotator step may take (default: 3600 seconds)
    #[serde(default = "default_annotator_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            timeout: default_annotator_timeout(),
        }
    }
}

/// When a queue entry is removed relative to its processing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimMode {
    /// Delete the entry when it is claimed, before processing (a crash loses it)
    #[default]
    AtMostOnce,
    /// Delete the entry after processing finishes, unless it was re-enqueued meanwhile
    AtLeastOnce,
}

/// Action queue settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name of the hash holding the queue entries (default: "parseQueue")
    #[serde(default = "default_queue_holder")]
    pub holder: String,

    /// Prefix applied to submission identifiers to form entry keys (default: "sub:")
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,

    /// Claim semantics for the consumer
    #[serde(default)]
    pub claim_mode: ClaimMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            holder: default_queue_holder(),
            id_prefix: default_id_prefix(),
            claim_mode: ClaimMode::default(),
        }
    }
}

/// Notification configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook configurations
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

/// Webhook target
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// URL to POST to
    pub url: String,

    /// Optional authentication header value
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Timeout for webhook requests (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

fn default_repository_dir() -> PathBuf {
    PathBuf::from("./repository")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./ontology-pull.db")
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    format!("ontology-pull/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_parser_timeout() -> Duration {
    Duration::from_secs(1800)
}

fn default_annotator_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_queue_holder() -> String {
    "parseQueue".to_string()
}

fn default_id_prefix() -> String {
    "sub:".to_string()
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (as whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
