//! Action-item extraction over an OpenAI-compatible completion endpoint.
//!
//! Each call is synchronous and single-attempt; retry policy, if any,
//! belongs to the caller. Malformed model output is a data condition: it
//! degrades to a non-action-item result instead of propagating, so one bad
//! completion can never abort a batch.

mod client;
mod prompt;
mod types;

pub use client::ExtractionClient;
pub use types::{
    ActionItem, ExtractConfig, ExtractError, MessageOutcome, Priority, Summary,
};
