use std::sync::Arc;

use crate::integrations::IntegrationRegistry;
use crate::poller::ServicePoller;
use crate::todo_store::TodoStore;

use super::config::ServiceConfig;

/// Shared handles for request handlers. Constructed once in `run_server`
/// and cloned per request; the poller thread holds the same `Arc`s, so
/// there is no hidden global state.
#[derive(Clone)]
pub(super) struct AppState {
    pub(super) config: Arc<ServiceConfig>,
    pub(super) store: Arc<TodoStore>,
    pub(super) poller: Arc<ServicePoller>,
    pub(super) integrations: Arc<IntegrationRegistry>,
}
