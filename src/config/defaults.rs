use super::schema::{FeedConfig, MailConfig, StoreConfig};

pub(super) fn default_tick_interval_secs() -> u64 {
    15
}

pub(super) fn default_event_queue_capacity() -> usize {
    50_000
}

pub(super) fn default_smtp_port() -> u16 {
    465
}

pub(super) fn default_store_path() -> String {
    "data/telemail_store".to_string()
}

pub(super) fn default_feed_mode() -> String {
    "simulated".to_string()
}

pub(super) fn default_feed_sample_interval_secs() -> u64 {
    5
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            archiver_urls: Vec::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            mode: default_feed_mode(),
            sample_interval_secs: default_feed_sample_interval_secs(),
        }
    }
}
