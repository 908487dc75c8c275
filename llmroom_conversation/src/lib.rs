#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Room conversations backed by a language model.
//!
//! Each inbound message runs through the same pipeline: authorization,
//! command filtering, room lookup, history append, backend call and reply.
//! Rooms keep their own history and may override the backend, model and
//! system prompt chosen by configuration.

mod command;
mod locks;
mod orchestrator;
mod service;
mod window;

pub use command::{RoomCommand, RoomCommands};
pub use locks::{RoomGuard, RoomLocks};
pub use orchestrator::{
    Components, ERROR_REPLY, IgnoreReason, Orchestrator, OrchestratorError, OrchestratorSettings,
    Outcome,
};
pub use service::RoomService;
pub use window::ContextWindow;
