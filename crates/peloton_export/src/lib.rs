//! Export Peloton workouts as TCX documents.
//!
//! The pipeline pulls each workout through a [`peloton_client::PelotonClient`],
//! renders it with [`tcx::build`], names it with [`filename::filename`] and
//! hands the bytes to a [`sink::Sink`]. Failures are recorded per activity in
//! a [`pipeline::RunReport`] and never abort the batch.

pub mod config;
pub mod error;
pub mod filename;
pub mod gcs;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod sink;
pub mod tcx;

mod test_utils;

pub use config::{ExportConfig, SinkTarget};
pub use error::ExportError;
pub use pipeline::{ActivityOutcome, Pipeline, RunReport};
pub use service::ExportService;
pub use sink::{LocalDirSink, MemorySink, Sink};
