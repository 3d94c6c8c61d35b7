#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox credentials are not configured (set MAIL_USER and MAIL_APP_PASSWORD)")]
    MissingCredentials,
    #[error("authentication rejected for {address}: {reason}")]
    Auth { address: String, reason: String },
    #[error("connection failed: {0}")]
    Connectivity(String),
    #[error("folder not found: {0}")]
    FolderNotFound(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl MailboxError {
    pub(crate) fn connectivity(err: impl std::fmt::Display) -> Self {
        MailboxError::Connectivity(err.to_string())
    }

    pub(crate) fn protocol(err: impl std::fmt::Display) -> Self {
        MailboxError::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for MailboxError {
    fn from(err: std::io::Error) -> Self {
        MailboxError::connectivity(err)
    }
}

impl From<native_tls::Error> for MailboxError {
    fn from(err: native_tls::Error) -> Self {
        MailboxError::connectivity(err)
    }
}
