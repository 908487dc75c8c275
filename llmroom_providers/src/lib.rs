#![deny(
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

mod openai;
mod registry;
mod retry;

pub use openai::BasicOpenAiBackend;
pub use registry::{BackendFactory, BackendKind, BackendRegistry, BackendRegistryBuilder};
pub use retry::RetryPolicy;
