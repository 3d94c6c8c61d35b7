pub mod integrations;
pub mod poller;
pub mod service;
pub mod todo_store;

pub use integrations::{Integration, IntegrationRegistry};
pub use poller::{
    start_poller_thread, ActionItemExtractor, MailPoller, MailSource, PollOutcome, PollStats,
    PollSummary, PollerConfig, PollerControl, PollerError, ServicePoller,
};
pub use service::{run_server, ServiceConfig};
pub use todo_store::{StoreError, Todo, TodoCreate, TodoStore, TodoUpdate};
