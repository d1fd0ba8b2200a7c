use crate::{err, naming::PublishConvention, Error};
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use std::path::Path;

/// Prefix of environment variables overriding configuration, e.g.
/// `LABEL_CATALOG__LARK__APP_SECRET`.
pub const ENV_PREFIX: &str = "LABEL_CATALOG";

/// Largest batch accepted by the Bitable batch-create endpoint.
pub const MAX_BATCH_SIZE: usize = 500;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: PublishConvention,
    pub upload: UploadConfig,
    pub lark: LarkConfig,
    pub catalog: CatalogConfig,
}

impl Settings {
    /// Layer an optional config file (any format the `config` crate detects from the extension)
    /// and `LABEL_CATALOG__*` environment variables over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .context(err::Config)
    }

    pub fn validate_for_upload(&self) -> Result<(), Error> {
        ensure!(
            !self.storage.bucket.is_empty(),
            err::InvalidConfig {
                message: "storage.bucket is not set"
            }
        );
        ensure!(
            self.upload.parallelism > 0,
            err::InvalidConfig {
                message: "upload.parallelism must be at least 1"
            }
        );
        self.upload.timing.validate()
    }

    pub fn validate_for_catalog(&self) -> Result<(), Error> {
        ensure!(
            !self.storage.bucket.is_empty(),
            err::InvalidConfig {
                message: "storage.bucket is not set"
            }
        );
        for (name, value) in [
            ("lark.app_id", &self.lark.app_id),
            ("lark.app_secret", &self.lark.app_secret),
            ("lark.app_token", &self.lark.app_token),
        ] {
            ensure!(
                !value.is_empty(),
                err::InvalidConfig {
                    message: format!("{} is not set", name)
                }
            );
        }
        ensure!(
            (1..=MAX_BATCH_SIZE).contains(&self.catalog.batch_size),
            err::InvalidConfig {
                message: format!(
                    "catalog.batch_size must be between 1 and {}, got {}",
                    MAX_BATCH_SIZE, self.catalog.batch_size
                )
            }
        );
        ensure!(
            self.lark.request_timeout_s > 0,
            err::InvalidConfig {
                message: "lark.request_timeout_s must be at least 1"
            }
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum number of simultaneous upload requests
    pub parallelism: usize,
    /// Number of times to retry a single request before giving up
    pub n_retries: usize,
    /// Pause between two attempts of the same request, in milliseconds
    pub retry_delay_ms: u64,
    /// `Content-Type` of every uploaded object
    pub content_type: String,
    pub timing: TimingConfig,
}
impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            parallelism: 20,
            n_retries: 0,
            retry_delay_ms: 200,
            content_type: "image/jpeg".to_string(),
            timing: TimingConfig::default(),
        }
    }
}

/// Parameters of the adaptive per-request timeout, see [`TimeoutState`](crate::timeout::TimeoutState).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Timeout (seconds) granted to every request regardless of its size
    pub base_timeout: f64,
    /// Timeout is set to a fraction of expected upload time (> 1.0)
    pub timeout_fraction: f64,
    /// Every retry, the timeout is multiplied by backoff (> 1.0)
    pub backoff: f64,
    /// Expected upload speed in MBps (megabytes per second) - used as an initial
    /// estimate.
    pub expected_upload_speed: f64,
    /// To estimate the upload speed incrementally, we use an exponential average:
    /// `new_avg_speed = avg_power * new_speed + (1 - avg_power) * avg_speed`.
    pub avg_power: f64,
    /// Only results from uploads larger than `avg_min_bytes` are used to estimate
    /// upload speed.
    pub avg_min_bytes: u64,
}
impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_timeout: 10.0,
            timeout_fraction: 1.5,
            backoff: 1.3,
            expected_upload_speed: 1.0,
            avg_power: 0.7,
            avg_min_bytes: 1_000_000,
        }
    }
}

impl TimingConfig {
    /// Every value must be finite; the timeout and speed factors must be positive and
    /// `avg_power` a weight in `[0, 1]`.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, value) in [
            ("base_timeout", self.base_timeout),
            ("timeout_fraction", self.timeout_fraction),
            ("backoff", self.backoff),
            ("expected_upload_speed", self.expected_upload_speed),
        ] {
            ensure!(
                value.is_finite() && value > 0.0,
                err::InvalidConfig {
                    message: format!("upload.timing.{} must be positive, got {}", name, value)
                }
            );
        }
        ensure!(
            (0.0..=1.0).contains(&self.avg_power),
            err::InvalidConfig {
                message: format!(
                    "upload.timing.avg_power must be between 0 and 1, got {}",
                    self.avg_power
                )
            }
        );
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LarkConfig {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    /// Token of the Bitable app every table is created under
    pub app_token: String,
    pub request_timeout_s: u64,
}
impl Default for LarkConfig {
    fn default() -> Self {
        Self {
            base_url: "https://open.feishu.cn".to_string(),
            app_id: String::new(),
            app_secret: String::new(),
            app_token: String::new(),
            request_timeout_s: 30,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Maximum number of records per table
    pub batch_size: usize,
    /// Tables are named `<table_prefix><sequence>`
    pub table_prefix: String,
    /// Zero-padded width of the sequence number in table names
    pub sequence_width: usize,
    pub default_view_name: String,
}
impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            table_prefix: "v1-labeling-table-".to_string(),
            sequence_width: 3,
            default_view_name: "data".to_string(),
        }
    }
}
