mod defaults;
mod io;
mod schema;
mod validate;

pub use io::load_config;
#[allow(unused_imports)]
pub use schema::{Config, FeedConfig, MailConfig, SmtpConfig, StoreConfig};
pub use validate::ConfigError;
