//! Shared types for Ozy.
//!
//! Every encrypted document carries one state blob per sub-application.
//! The set of sub-applications is closed; each blob carries its own
//! `version` so sub-applications can evolve their payloads independently.
//! Payloads beyond `version` are opaque to the sync core.

mod error;
mod schedule;
mod sub_app;

pub use error::{StateError, StateResult};
pub use schedule::{ScheduleState, SCHEDULE_VERSION, TIME_BLOCK_LENGTH_MINUTES};
pub use sub_app::{SubApp, SubAppsState, VersionedState};
