use serde::Deserialize;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seconds between forced re-evaluations of every monitored point.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// Capacity of the bounded dispatcher queue between entries and consumers.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// STARTTLS when true, implicit TLS otherwise.
    #[serde(default)]
    pub tls: bool,
    pub login: String,
    pub password: String,
    /// Sender address; falls back to `login` when absent.
    #[serde(default)]
    pub from: Option<String>,
}

impl SmtpConfig {
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.login)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Archiver viewer base URLs linked at the bottom of alarm messages.
    #[serde(default)]
    pub archiver_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_mode")]
    pub mode: String,
    /// Interval between generated samples in simulated mode.
    #[serde(default = "default_feed_sample_interval_secs")]
    pub sample_interval_secs: u64,
}
