//! Runtime configuration, read from the environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use drift_store::FsSnapshotStore;
use serde::Serialize;

use crate::error::{DriftError, Result};
use crate::fetch::{FetchSettings, HttpFetcher, DEFAULT_FETCH_TIMEOUT};
use crate::job::{DriftJob, JobSettings};
use crate::notify::{HttpMailer, Notifier, OutboxNotifier};
use crate::schedule::DEFAULT_RUN_HOUR_UTC;

pub const ENV_BUCKET: &str = "WEBPAGE_BUCKET_NAME";
pub const ENV_RECIPIENT: &str = "NOTIFICATION_EMAIL";
pub const ENV_SENDER: &str = "DRIFT_EMAIL_SENDER";
pub const ENV_MAIL_ENDPOINT: &str = "DRIFT_MAIL_ENDPOINT";
pub const ENV_MAIL_TOKEN: &str = "DRIFT_MAIL_TOKEN";
pub const ENV_OUTBOX: &str = "DRIFT_OUTBOX_DIR";
pub const ENV_CATALOG: &str = "DRIFT_CATALOG";
pub const ENV_FETCH_TIMEOUT: &str = "DRIFT_FETCH_TIMEOUT_SECS";
pub const ENV_SCHEDULE_HOUR: &str = "DRIFT_SCHEDULE_HOUR";

pub const DEFAULT_SENDER: &str = "drift-production@pl-conferences.com";
pub const DEFAULT_CATALOG: &str = "events.json";

/// Where reports go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MailTransport {
    /// POST to an HTTP mail relay
    Relay {
        endpoint: String,
        #[serde(skip)]
        token: Option<String>,
    },
    /// Write HTML files into a directory
    Outbox { dir: PathBuf },
}

/// Drift checker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftConfig {
    /// Root of the snapshot store
    pub snapshot_root: PathBuf,
    /// Operator address; required unless running dry
    pub recipient: Option<String>,
    pub sender: String,
    pub mail: MailTransport,
    pub catalog_path: PathBuf,
    pub fetch_timeout: Duration,
    pub schedule_hour: u32,
}

impl DriftConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let snapshot_root = get(ENV_BUCKET)
            .map(PathBuf::from)
            .ok_or_else(|| DriftError::Config(format!("{ENV_BUCKET} is not set")))?;

        let mail = match get(ENV_MAIL_ENDPOINT) {
            Some(endpoint) => MailTransport::Relay {
                endpoint,
                token: get(ENV_MAIL_TOKEN),
            },
            None => MailTransport::Outbox {
                dir: get(ENV_OUTBOX)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| snapshot_root.join("outbox")),
            },
        };

        let fetch_timeout = match get(ENV_FETCH_TIMEOUT) {
            Some(v) => Duration::from_secs(parse_number(ENV_FETCH_TIMEOUT, &v)?),
            None => DEFAULT_FETCH_TIMEOUT,
        };
        if fetch_timeout.is_zero() {
            return Err(DriftError::Config(format!("{ENV_FETCH_TIMEOUT} must be positive")));
        }

        let schedule_hour = match get(ENV_SCHEDULE_HOUR) {
            Some(v) => parse_number(ENV_SCHEDULE_HOUR, &v)?,
            None => DEFAULT_RUN_HOUR_UTC,
        };
        if schedule_hour > 23 {
            return Err(DriftError::Config(format!(
                "{ENV_SCHEDULE_HOUR} must be between 0 and 23, got {schedule_hour}"
            )));
        }

        Ok(DriftConfig {
            snapshot_root,
            recipient: get(ENV_RECIPIENT),
            sender: get(ENV_SENDER).unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            mail,
            catalog_path: get(ENV_CATALOG)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG)),
            fetch_timeout,
            schedule_hour,
        })
    }

    /// Job settings for this configuration. A recipient is required unless
    /// the run is dry.
    pub fn job_settings(&self, dry_run: bool) -> Result<JobSettings> {
        let to = match (&self.recipient, dry_run) {
            (Some(to), _) => to.clone(),
            (None, true) => String::new(),
            (None, false) => {
                return Err(DriftError::Config(format!("{ENV_RECIPIENT} is not set")));
            }
        };
        Ok(JobSettings {
            from: self.sender.clone(),
            to,
            dry_run,
        })
    }

    pub fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        let notifier: Arc<dyn Notifier> = match &self.mail {
            MailTransport::Relay { endpoint, token } => {
                Arc::new(HttpMailer::new(endpoint, token.clone(), self.fetch_timeout)?)
            }
            MailTransport::Outbox { dir } => Arc::new(OutboxNotifier::new(dir)),
        };
        Ok(notifier)
    }

    /// Build the job with its production collaborators.
    pub fn build_job(&self, dry_run: bool) -> Result<DriftJob> {
        let settings = self.job_settings(dry_run)?;
        let store = FsSnapshotStore::new(&self.snapshot_root)?;
        let fetcher = HttpFetcher::new(FetchSettings {
            timeout: self.fetch_timeout,
            ..FetchSettings::default()
        })?;
        Ok(DriftJob::new(
            Arc::new(store),
            Arc::new(fetcher),
            self.notifier()?,
            settings,
        ))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DriftError::Config(format!("{key} is not a valid number: {value:?}")))
}
