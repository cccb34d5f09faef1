use std::{
    fs::{create_dir_all, File},
    io::{Read, Write},
    path::Path,
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::api::retrieve::RetryPolicy;

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Endpoints and enrollment identifiers of the InCommon SSL API.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    /// Sent as `orgId`: requests are filed under the department.
    pub department: u32,
    pub customer_uri: String,
    pub server_cert_type: u32,
    pub multi_domain_cert_type: u32,
    pub server_type: i32,
    pub term: u32,
    pub listing_path: String,
    pub enroll_path: String,
    pub retrieve_path: String,
    /// Field of the enroll response holding the tracking id.
    pub tracking_field: String,
    /// Suffix of the collect url selecting the certificate format.
    pub certificate_format: String,
    pub content_type: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cert-manager.com".into(),
            department: 9732,
            customer_uri: "InCommon".into(),
            server_cert_type: 215,
            multi_domain_cert_type: 283,
            server_type: -1,
            term: 395,
            listing_path: "/private/api/ssl/v1/types".into(),
            enroll_path: "/private/api/ssl/v1/enroll".into(),
            retrieve_path: "/private/api/ssl/v1/collect/".into(),
            tracking_field: "sslId".into(),
            certificate_format: "/x509CO".into(),
            content_type: "application/json".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub approval_wait_secs: u64,
    pub retrieval_attempts: u32,
    pub retrieval_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            approval_wait_secs: 30,
            retrieval_attempts: 20,
            retrieval_interval_secs: 5,
        }
    }
}

impl TimingConfig {
    pub fn approval_wait(&self) -> Duration {
        Duration::from_secs(self.approval_wait_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.retrieval_attempts,
            interval: Duration::from_secs(self.retrieval_interval_secs),
        }
    }
}

pub fn create_default_config() -> Config {
    Config {
        api: ApiConfig::default(),
        timing: TimingConfig::default(),
    }
}

fn parse_config_file(path: &Path) -> anyhow::Result<Config> {
    let mut str = String::new();
    File::open(path)
        .with_context(|| format!("can't open {path:?}"))?
        .read_to_string(&mut str)
        .with_context(|| format!("Can't read {path:?}"))?;
    toml::from_str::<Config>(&str)
        .with_context(|| format!("Can't parse file {path:?}"))
}

/// Reads the user supplied config, or the per-user default config which is
/// created on first use.
pub fn read_config(
    config_dir: &Path,
    user_config_path: Option<&Path>,
) -> anyhow::Result<Config> {
    if let Some(user_config_path) = user_config_path {
        if !user_config_path.exists() {
            anyhow::bail!("can't find file {user_config_path:?}");
        }
        return parse_config_file(user_config_path);
    }
    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        parse_config_file(&config_path)
    } else {
        let config = create_default_config();
        create_dir_all(config_dir).context("Can't create config dir")?;
        File::create(&config_path)
            .with_context(|| format!("Can't create file {config_path:?}"))?
            .write_all(toml::to_string_pretty(&config)?.as_bytes())
            .with_context(|| format!("Can't write file {config_path:?}"))?;
        Ok(config)
    }
}
