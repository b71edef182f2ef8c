//! The shared config for all clipforge services

use std::path::Path;
use tracing_subscriber::filter::LevelFilter;

/// Helps serde default a value to false
fn default_false() -> bool {
    false
}

/// Helps serde default the namespace keys are built under
fn default_namespace() -> String {
    "clipforge".to_owned()
}

/// Helps serde default the interface to bind to
fn default_interface() -> String {
    "0.0.0.0".to_owned()
}

/// Helps serde default the port to bind to
fn default_port() -> u16 {
    8000
}

/// The log levels clipforge can log at
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Do not log anything
    Off,
    /// Log only errors
    Error,
    /// Log setup messages and errors
    Setup,
    /// Log info and above
    Info,
    /// Log debug and above
    Debug,
    /// Log everything
    Trace,
}

impl Default for LogLevel {
    /// Default to logging info and above
    fn default() -> Self {
        LogLevel::Info
    }
}

impl LogLevel {
    /// Cast this log level to a tracing level filter
    #[must_use]
    pub fn to_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Setup | LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Try to parse a log level from a string
    ///
    /// # Arguments
    ///
    /// * `raw` - The raw string to parse
    #[must_use]
    pub fn from_str_loose(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "off" => Some(LogLevel::Off),
            "error" => Some(LogLevel::Error),
            "setup" => Some(LogLevel::Setup),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Tracing settings for clipforge services
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Tracing {
    /// The level to log at
    #[serde(default)]
    pub level: LogLevel,
}

/// Helps serde default the redis host
fn default_redis_host() -> String {
    "127.0.0.1".to_owned()
}

/// Helps serde default the redis port
fn default_redis_port() -> u16 {
    6379
}

/// The settings for the redis backed state store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Redis {
    /// A full connection url overriding host/port/auth when set
    #[serde(default)]
    pub url: Option<String>,
    /// The host redis is reachable at
    #[serde(default = "default_redis_host")]
    pub host: String,
    /// The port redis is bound to
    #[serde(default = "default_redis_port")]
    pub port: u16,
    /// The number of connections to have in the connection pool
    #[serde(default)]
    pub pool_size: Option<u32>,
    /// A username to use if redis has authentication enabled
    #[serde(default)]
    pub username: Option<String>,
    /// A password to use if redis has authentication enabled
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for Redis {
    /// Build a default redis config aimed at a local redis
    fn default() -> Self {
        Redis {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            pool_size: None,
            username: None,
            password: None,
        }
    }
}

impl Redis {
    /// Build the connection url for this redis config
    ///
    /// An explicit url wins; otherwise one is composed from the host, port,
    /// and any auth that is set.
    ///
    /// # Panics
    ///
    /// Panics when a username is set without a password.
    #[must_use]
    pub fn connection_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => match (&self.username, &self.password) {
                // redis with username/password auth setup
                (Some(user), Some(password)) => {
                    format!("redis://{}:{}@{}:{}/", user, password, self.host, self.port)
                }
                (None, Some(password)) => {
                    format!("redis://default:{}@{}:{}/", password, self.host, self.port)
                }
                (None, None) => format!("redis://{}:{}/", self.host, self.port),
                _ => panic!("Redis Setup Error - Password must be set if username is set"),
            },
        }
    }
}

/// Helps serde default the provider api url
fn default_provider_url() -> String {
    "https://api.machines.dev/v1".to_owned()
}

/// Helps serde default the app machines are created under
fn default_provider_app() -> String {
    "clipforge".to_owned()
}

/// Helps serde default the region machines are created in
fn default_provider_region() -> String {
    "iad".to_owned()
}

/// Helps serde default the image workers are booted from
fn default_worker_image() -> String {
    "ghcr.io/clipforge/worker:latest".to_owned()
}

/// The settings for the compute provider machines are created on
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Provider {
    /// The token to authenticate to the provider api with
    ///
    /// Leaving this unset places clipforge in dev mode where no
    /// machines are ever created or destroyed.
    #[serde(default)]
    pub token: Option<String>,
    /// The base url for the provider api
    #[serde(default = "default_provider_url")]
    pub url: String,
    /// The app to create machines under
    #[serde(default = "default_provider_app")]
    pub app_name: String,
    /// The region to create machines in
    #[serde(default = "default_provider_region")]
    pub region: String,
    /// The image to boot worker machines from
    #[serde(default = "default_worker_image")]
    pub image: String,
}

impl Default for Provider {
    /// Build a default provider config with no auth set
    fn default() -> Self {
        Provider {
            token: None,
            url: default_provider_url(),
            app_name: default_provider_app(),
            region: default_provider_region(),
            image: default_worker_image(),
        }
    }
}

/// Helps serde default the object store host
fn default_object_store_host() -> String {
    "r2.cloudflarestorage.com".to_owned()
}

/// Helps serde default the object store region
fn default_object_store_region() -> String {
    "auto".to_owned()
}

/// Helps serde default the input bucket name
fn default_input_bucket() -> String {
    "clipforge-inputs".to_owned()
}

/// Helps serde default the output bucket name
fn default_output_bucket() -> String {
    "clipforge-outputs".to_owned()
}

/// The settings for the object store media bytes live in
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObjectStore {
    /// The account id for the object store
    #[serde(default)]
    pub account_id: String,
    /// The access key to authenticate with
    #[serde(default)]
    pub access_key: String,
    /// The secret key to authenticate with
    #[serde(default)]
    pub secret_token: String,
    /// The host the object store is reachable at
    #[serde(default = "default_object_store_host")]
    pub host: String,
    /// The region to pass to the s3 client
    #[serde(default = "default_object_store_region")]
    pub region: String,
    /// The bucket uploads land in
    #[serde(default = "default_input_bucket")]
    pub input_bucket: String,
    /// The bucket transcoded outputs are written to
    #[serde(default = "default_output_bucket")]
    pub output_bucket: String,
}

impl Default for ObjectStore {
    /// Build a default object store config
    fn default() -> Self {
        ObjectStore {
            account_id: String::default(),
            access_key: String::default(),
            secret_token: String::default(),
            host: default_object_store_host(),
            region: default_object_store_region(),
            input_bucket: default_input_bucket(),
            output_bucket: default_output_bucket(),
        }
    }
}

impl ObjectStore {
    /// Build the endpoint url for the s3 client
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("https://{}.{}", self.account_id, self.host)
    }

    /// Build the canonical public url for an object
    ///
    /// # Arguments
    ///
    /// * `bucket` - The bucket this object is in
    /// * `key` - The key this object is at
    #[must_use]
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("https://{}.{}/{}/{}", self.account_id, self.host, bucket, key)
    }
}

/// The settings for webhooks clipforge sends
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Webhooks {
    /// The base url workers post job completion webhooks to
    #[serde(default)]
    pub base_url: String,
}

impl Default for Webhooks {
    /// Build a default webhook config
    fn default() -> Self {
        Webhooks {
            base_url: String::default(),
        }
    }
}

/// Helps serde default the max number of machines in the pool
fn default_max_machines() -> u64 {
    10
}

/// Helps serde default how long a machine may idle before it is stopped
fn default_idle_timeout_ms() -> u64 {
    300_000
}

/// Helps serde default how long workers sleep between queue polls
fn default_poll_interval_ms() -> u64 {
    5_000
}

/// Helps serde default how long job records live in the state store
fn default_job_status_ttl() -> u64 {
    86_400
}

/// Helps serde default how many times a job may be requeued
fn default_max_job_retries() -> u64 {
    3
}

/// Helps serde default the base delay for provider retries
fn default_backoff_base_ms() -> u64 {
    100
}

/// Helps serde default the max delay for provider retries
fn default_backoff_max_ms() -> u64 {
    10_000
}

/// Helps serde default how long presigned upload urls live
fn default_presigned_url_expiry() -> u64 {
    3_600
}

/// Helps serde default the grace period added before upload recovery
fn default_uploading_recovery_buffer() -> u64 {
    300
}

/// Helps serde default the width of the rate limit window
fn default_rate_limit_window_ms() -> u64 {
    1_000
}

/// The tunables that bound the machine pool and job lifecycle
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Limits {
    /// The max number of machines the pool may hold
    #[serde(default = "default_max_machines")]
    pub max_machines: u64,
    /// How long a machine may sit idle before the reaper stops it
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// How long workers sleep between empty queue polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long job records live in the state store in seconds
    #[serde(default = "default_job_status_ttl")]
    pub job_status_ttl: u64,
    /// How many times a job may be requeued before it is failed
    #[serde(default = "default_max_job_retries")]
    pub max_job_retries: u64,
    /// The base delay in ms for provider api retries
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// The cap in ms on provider api retry delays
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// How long presigned upload urls live in seconds
    #[serde(default = "default_presigned_url_expiry")]
    pub presigned_url_expiry: u64,
    /// The grace period in seconds added on top of the presigned url
    /// lifetime before a stuck upload is recovered
    #[serde(default = "default_uploading_recovery_buffer")]
    pub uploading_recovery_buffer: u64,
    /// The width of the provider rate limit window in ms
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
}

impl Default for Limits {
    /// Build the default pool and lifecycle limits
    fn default() -> Self {
        Limits {
            max_machines: default_max_machines(),
            idle_timeout_ms: default_idle_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            job_status_ttl: default_job_status_ttl(),
            max_job_retries: default_max_job_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            presigned_url_expiry: default_presigned_url_expiry(),
            uploading_recovery_buffer: default_uploading_recovery_buffer(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
        }
    }
}

impl Limits {
    /// The age in ms past which an uploading job is considered stuck
    #[must_use]
    pub fn stuck_upload_threshold_ms(&self) -> i64 {
        ((self.presigned_url_expiry + self.uploading_recovery_buffer) * 1000) as i64
    }
}

/// Helps serde default the delay between idle stop sweeps
fn default_idle_stop_delay() -> u32 {
    60
}

/// Helps serde default the delay between stuck upload sweeps
fn default_stuck_uploads_delay() -> u32 {
    60
}

/// Helps serde default the delay between pool reconciliations
fn default_pool_sync_delay() -> u32 {
    300
}

/// Helps serde default how many records one sweep may check
fn default_sweep_limit() -> u64 {
    100
}

/// The cadence settings for the reaper's background tasks
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReaperTasks {
    /// Seconds between idle stop sweeps
    #[serde(default = "default_idle_stop_delay")]
    pub idle_stop: u32,
    /// Seconds between stuck upload sweeps
    #[serde(default = "default_stuck_uploads_delay")]
    pub stuck_uploads: u32,
    /// Seconds between machine pool reconciliations
    #[serde(default = "default_pool_sync_delay")]
    pub pool_sync: u32,
    /// The max number of job records one sweep invocation may check
    #[serde(default = "default_sweep_limit")]
    pub sweep_limit: u64,
}

impl Default for ReaperTasks {
    /// Build the default reaper cadence
    fn default() -> Self {
        ReaperTasks {
            idle_stop: default_idle_stop_delay(),
            stuck_uploads: default_stuck_uploads_delay(),
            pool_sync: default_pool_sync_delay(),
            sweep_limit: default_sweep_limit(),
        }
    }
}

/// Helps serde default the scratch dir workers stage media in
fn default_scratch_dir() -> String {
    "/tmp/clipforge".to_owned()
}

/// The settings for worker processes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// The dir workers stage downloaded/transcoded media in
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,
    /// The transcoder command to invoke for each job
    #[serde(default)]
    pub runner_cmd: Option<String>,
}

impl Default for WorkerSettings {
    /// Build the default worker settings
    fn default() -> Self {
        WorkerSettings {
            scratch_dir: default_scratch_dir(),
            runner_cmd: None,
        }
    }
}

/// The cors rules to apply to the clipforge api
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Cors {
    /// Whether to allow all cross origin requests
    #[serde(default = "default_false")]
    pub insecure: bool,
    /// The domains to allow cross origin requests from
    #[serde(default)]
    pub domains: Vec<String>,
}

impl Default for Cors {
    /// Build a default locked down cors config
    fn default() -> Self {
        Cors {
            insecure: false,
            domains: Vec::default(),
        }
    }
}

/// The core clipforge settings shared by all services
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Clipforge {
    /// The namespace to build state store keys under
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// The interface the api binds to
    #[serde(default = "default_interface")]
    pub interface: String,
    /// The port the api binds to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether to force dev mode regardless of provider auth
    #[serde(default = "default_false")]
    pub dev_mode: bool,
    /// The webhook settings
    #[serde(default)]
    pub webhooks: Webhooks,
    /// The cors rules for the api
    #[serde(default)]
    pub cors: Cors,
    /// The tracing settings
    #[serde(default)]
    pub tracing: Tracing,
    /// The pool and lifecycle limits
    #[serde(default)]
    pub limits: Limits,
    /// The reaper task cadence
    #[serde(default)]
    pub reaper: ReaperTasks,
    /// The worker process settings
    #[serde(default)]
    pub worker: WorkerSettings,
}

impl Default for Clipforge {
    /// Build the default core settings
    fn default() -> Self {
        Clipforge {
            namespace: default_namespace(),
            interface: default_interface(),
            port: default_port(),
            dev_mode: false,
            webhooks: Webhooks::default(),
            cors: Cors::default(),
            tracing: Tracing::default(),
            limits: Limits::default(),
            reaper: ReaperTasks::default(),
            worker: WorkerSettings::default(),
        }
    }
}

/// The full config for clipforge services
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Conf {
    /// The core clipforge settings
    #[serde(default)]
    pub clipforge: Clipforge,
    /// The state store settings
    #[serde(default)]
    pub redis: Redis,
    /// The compute provider settings
    #[serde(default)]
    pub provider: Provider,
    /// The object store settings
    #[serde(default)]
    pub object_store: ObjectStore,
}

/// Overwrite a config field if an env var is set and non empty
macro_rules! env_override {
    ($field:expr, $name:expr) => {
        if let Ok(val) = std::env::var($name) {
            if !val.is_empty() {
                $field = val;
            }
        }
    };
    ($field:expr, $name:expr, opt) => {
        if let Ok(val) = std::env::var($name) {
            if !val.is_empty() {
                $field = Some(val);
            }
        }
    };
}

impl Conf {
    /// Creates a new [`Conf`] object
    ///
    /// The config file is optional; anything it sets can be overlayed with
    /// `CLIPFORGE__` prefixed env vars or the flat operator env names.
    ///
    /// # Arguments
    ///
    /// * `path` - The path to use when reading the config file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let mut conf: Conf = config::Config::builder()
            // load from a file first if one exists
            .add_source(
                config::File::from(path.as_ref())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            // then overlay any environment args ontop
            .add_source(
                config::Environment::with_prefix("clipforge")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        // apply the flat operator env names ontop of whatever was loaded
        env_override!(conf.redis.url, "UPSTREAM_STATE_STORE_URL", opt);
        env_override!(conf.redis.password, "UPSTREAM_STATE_STORE_TOKEN", opt);
        env_override!(conf.provider.token, "PROVIDER_API_TOKEN", opt);
        env_override!(conf.provider.app_name, "PROVIDER_APP_NAME");
        env_override!(conf.provider.region, "PROVIDER_REGION");
        env_override!(conf.clipforge.webhooks.base_url, "WEBHOOK_BASE_URL");
        env_override!(conf.object_store.account_id, "OBJECT_STORE_ACCOUNT_ID");
        env_override!(conf.object_store.access_key, "OBJECT_STORE_ACCESS_KEY_ID");
        env_override!(
            conf.object_store.secret_token,
            "OBJECT_STORE_SECRET_ACCESS_KEY"
        );
        env_override!(conf.object_store.input_bucket, "OBJECT_STORE_INPUT_BUCKET");
        env_override!(conf.object_store.output_bucket, "OBJECT_STORE_OUTPUT_BUCKET");
        // the log level env name carries a bare level token
        if let Ok(raw) = std::env::var("LOG_LEVEL") {
            if let Some(level) = LogLevel::from_str_loose(&raw) {
                conf.clipforge.tracing.level = level;
            }
        }
        Ok(conf)
    }

    /// Change the namespace for this config
    ///
    /// # Arguments
    ///
    /// * `namespace` - The namespace for this config
    #[must_use]
    pub fn namespace<T: Into<String>>(mut self, namespace: T) -> Self {
        // update this configs namespace
        self.clipforge.namespace = namespace.into();
        self
    }

    /// Whether this config places clipforge in dev mode
    ///
    /// Dev mode is active when explicitly flagged or when no provider
    /// token is configured; no machines are created or stopped in dev mode.
    #[must_use]
    pub fn dev_mode(&self) -> bool {
        match (&self.clipforge.dev_mode, &self.provider.token) {
            (true, _) => true,
            (false, Some(token)) => token.is_empty(),
            (false, None) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_orchestrator_constants() {
        let conf = Conf::default();
        assert_eq!(conf.clipforge.limits.max_machines, 10);
        assert_eq!(conf.clipforge.limits.idle_timeout_ms, 300_000);
        assert_eq!(conf.clipforge.limits.poll_interval_ms, 5_000);
        assert_eq!(conf.clipforge.limits.job_status_ttl, 86_400);
        assert_eq!(conf.clipforge.limits.max_job_retries, 3);
        assert_eq!(conf.clipforge.limits.backoff_base_ms, 100);
        assert_eq!(conf.clipforge.limits.backoff_max_ms, 10_000);
        assert_eq!(conf.clipforge.limits.presigned_url_expiry, 3_600);
        assert_eq!(conf.clipforge.limits.uploading_recovery_buffer, 300);
        assert_eq!(conf.clipforge.limits.rate_limit_window_ms, 1_000);
    }

    #[test]
    fn stuck_upload_threshold_adds_buffer() {
        let limits = Limits::default();
        assert_eq!(limits.stuck_upload_threshold_ms(), 3_900_000);
    }

    #[test]
    fn dev_mode_tracks_provider_auth() {
        // no token at all means dev mode
        let mut conf = Conf::default();
        assert!(conf.dev_mode());
        // an empty token is still dev mode
        conf.provider.token = Some(String::default());
        assert!(conf.dev_mode());
        // a real token disables dev mode
        conf.provider.token = Some("pat_123".to_owned());
        assert!(!conf.dev_mode());
        // the explicit flag wins over a real token
        conf.clipforge.dev_mode = true;
        assert!(conf.dev_mode());
    }

    #[test]
    fn object_urls_use_the_canonical_form() {
        let mut store = ObjectStore::default();
        store.account_id = "acct123".to_owned();
        assert_eq!(store.endpoint(), "https://acct123.r2.cloudflarestorage.com");
        assert_eq!(
            store.object_url("clipforge-inputs", "inputs/j1/v.mp4"),
            "https://acct123.r2.cloudflarestorage.com/clipforge-inputs/inputs/j1/v.mp4"
        );
    }
}
