use std::env;
use std::path::PathBuf;
use std::time::Duration;

use extract_module::ExtractConfig;
use mailbox_module::MailboxConfig;

use crate::poller::PollerConfig;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Everything the service binary needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Snapshot location for the todo collection.
    pub todos_path: PathBuf,
    pub poll_interval: Duration,
    /// `source` tag stamped on todos created from mailbox messages.
    pub source_tag: String,
    /// Origins allowed by the CORS layer (the dashboard frontend).
    pub cors_origins: Vec<String>,
    pub mailbox: MailboxConfig,
    pub extract: ExtractConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let host = env::var("SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SERVICE_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let todos_path = data_dir.join("todos.json");

        let poll_interval = env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));

        let source_tag = env::var("MAIL_SOURCE_TAG").unwrap_or_else(|_| "mailbox".to_string());

        let cors_origins = env::var("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        Self {
            host,
            port,
            todos_path,
            poll_interval,
            source_tag,
            cors_origins,
            mailbox: MailboxConfig::from_env(),
            extract: ExtractConfig::from_env(),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            folder: self.mailbox.folder.clone(),
            page_size: self.mailbox.page_size,
            poll_interval: self.poll_interval,
            source_tag: self.source_tag.clone(),
        }
    }
}
