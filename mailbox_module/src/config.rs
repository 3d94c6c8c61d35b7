use std::env;
use std::time::Duration;

pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_FOLDER: &str = "INBOX";
pub const DEFAULT_PAGE_SIZE: usize = 10;
const DEFAULT_IO_TIMEOUT_SECS: u64 = 30;

/// Connection parameters for one IMAP mailbox.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Account address, also used as the IMAP login name.
    pub address: String,
    /// App password (IMAP does not see the primary account password).
    pub app_password: String,
    pub host: String,
    pub port: u16,
    /// Folder polled by default.
    pub folder: String,
    /// Messages fetched per listing.
    pub page_size: usize,
    /// Applied to connect, read and write on the underlying socket.
    pub io_timeout: Duration,
}

impl MailboxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let address = env::var("MAIL_USER").unwrap_or_default();
        let app_password = env::var("MAIL_APP_PASSWORD").unwrap_or_default();

        let host = env::var("MAIL_IMAP_HOST").unwrap_or_else(|_| "imap.gmail.com".to_string());
        let port = env::var("MAIL_IMAP_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_IMAP_PORT);

        let folder = env::var("MAIL_FOLDER").unwrap_or_else(|_| DEFAULT_FOLDER.to_string());
        let page_size = env::var("MAIL_PAGE_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let io_timeout = env::var("MAIL_IO_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_IO_TIMEOUT_SECS));

        Self {
            address,
            app_password,
            host,
            port,
            folder,
            page_size,
            io_timeout,
        }
    }

    /// Whether both credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.address.trim().is_empty() && !self.app_password.trim().is_empty()
    }
}
