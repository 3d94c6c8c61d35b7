use std::net::{TcpStream, ToSocketAddrs};

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use crate::message::Message;

type ImapSession = imap::Session<TlsStream<TcpStream>>;

/// A blocking IMAP client holding at most one authenticated session.
///
/// The session is established lazily: listing auto-connects when needed.
/// Dropping the client logs out, so the connection is released on every
/// exit path.
pub struct MailboxClient {
    config: MailboxConfig,
    session: Option<ImapSession>,
}

impl MailboxClient {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    /// Establish an authenticated session. Calling while connected is a
    /// no-op. Missing credentials fail before any network activity.
    pub fn connect(&mut self) -> Result<(), MailboxError> {
        if self.session.is_some() {
            return Ok(());
        }
        if !self.config.has_credentials() {
            return Err(MailboxError::MissingCredentials);
        }

        let addr = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                MailboxError::Connectivity(format!("could not resolve {}", self.config.host))
            })?;

        let tcp = TcpStream::connect_timeout(&addr, self.config.io_timeout)?;
        tcp.set_read_timeout(Some(self.config.io_timeout))?;
        tcp.set_write_timeout(Some(self.config.io_timeout))?;

        let tls = TlsConnector::new()?;
        let stream = tls
            .connect(&self.config.host, tcp)
            .map_err(MailboxError::connectivity)?;

        let mut client = imap::Client::new(stream);
        client
            .read_greeting()
            .map_err(MailboxError::connectivity)?;

        let session = client
            .login(&self.config.address, &self.config.app_password)
            .map_err(|(err, _client)| match err {
                imap::error::Error::Io(io) => MailboxError::connectivity(io),
                other => MailboxError::Auth {
                    address: self.config.address.clone(),
                    reason: other.to_string(),
                },
            })?;

        info!("connected to {} as {}", self.config.host, self.config.address);
        self.session = Some(session);
        Ok(())
    }

    /// Release the session. Safe to call when not connected.
    pub fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(err) = session.logout() {
                debug!("imap logout failed: {}", err);
            }
        }
    }

    /// List the newest messages in `folder`, bounded to `limit` entries,
    /// newest first. Auto-connects when no session exists.
    pub fn list_messages(
        &mut self,
        folder: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Message>, MailboxError> {
        self.connect()?;
        let session = self.session_mut()?;

        session.select(folder).map_err(|err| match err {
            imap::error::Error::No(_) | imap::error::Error::Bad(_) => {
                MailboxError::FolderNotFound(folder.to_string())
            }
            imap::error::Error::Io(io) => MailboxError::connectivity(io),
            other => MailboxError::protocol(other),
        })?;

        let query = if unread_only { "UNSEEN" } else { "ALL" };
        let uids = session.uid_search(query).map_err(map_session_err)?;

        // Uids ascend with arrival; the newest `limit` come last.
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        let picked: Vec<u32> = uids.into_iter().rev().take(limit).collect();

        let mut messages = Vec::with_capacity(picked.len());
        for uid in picked {
            // BODY.PEEK keeps the \Seen flag untouched; marking read stays an
            // explicit, separate operation.
            let fetched = match session.uid_fetch(uid.to_string(), "(FLAGS BODY.PEEK[])") {
                Ok(fetched) => fetched,
                Err(err) => {
                    warn!("failed to fetch message {}/{}: {}", folder, uid, err);
                    continue;
                }
            };
            for fetch in fetched.iter() {
                let Some(body) = fetch.body() else {
                    continue;
                };
                let seen = fetch
                    .flags()
                    .iter()
                    .any(|flag| matches!(flag, imap::types::Flag::Seen));
                messages.push(Message::from_rfc822(folder, uid, body, !seen));
            }
        }

        debug!(
            "listed {} {} messages from {}",
            messages.len(),
            if unread_only { "unread" } else { "total" },
            folder
        );
        Ok(messages)
    }

    /// Mark a message read. Best effort: a rejected flag change is reported
    /// as `false`, never an error.
    pub fn mark_read(&mut self, message_id: &str) -> bool {
        self.set_flags(message_id, "+FLAGS (\\Seen)")
    }

    /// Mark a message unread. Same best-effort contract as [`mark_read`].
    ///
    /// [`mark_read`]: MailboxClient::mark_read
    pub fn mark_unread(&mut self, message_id: &str) -> bool {
        self.set_flags(message_id, "-FLAGS (\\Seen)")
    }

    /// List available folder names.
    pub fn list_folders(&mut self) -> Result<Vec<String>, MailboxError> {
        self.connect()?;
        let session = self.session_mut()?;
        let names = session.list(None, Some("*")).map_err(map_session_err)?;
        Ok(names.iter().map(|name| name.name().to_string()).collect())
    }

    fn set_flags(&mut self, message_id: &str, flags: &str) -> bool {
        let Some((folder, uid)) = split_message_id(message_id) else {
            warn!("malformed message id: {}", message_id);
            return false;
        };
        let folder = folder.to_string();

        let result = self.connect().and_then(|_| {
            let session = self.session_mut()?;
            session.select(&folder).map_err(map_session_err)?;
            session
                .uid_store(uid.to_string(), flags)
                .map_err(map_session_err)?;
            Ok(())
        });

        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("flag update {} on {} failed: {}", flags, message_id, err);
                false
            }
        }
    }

    fn session_mut(&mut self) -> Result<&mut ImapSession, MailboxError> {
        self.session
            .as_mut()
            .ok_or_else(|| MailboxError::Connectivity("no active session".to_string()))
    }
}

impl Drop for MailboxClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn map_session_err(err: imap::error::Error) -> MailboxError {
    match err {
        imap::error::Error::Io(io) => MailboxError::connectivity(io),
        other => MailboxError::protocol(other),
    }
}

/// Message ids are `folder/uid`; folder names may themselves contain `/`,
/// so the uid is everything after the last separator.
fn split_message_id(id: &str) -> Option<(&str, u32)> {
    let (folder, uid) = id.rsplit_once('/')?;
    let uid = uid.parse().ok()?;
    Some((folder, uid))
}
