pub mod archive;
pub mod config;
pub mod crypto;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod records;
pub mod schema;
pub mod sink;
pub mod transform;

pub use config::RefinerConfig;
pub use error::{PipelineError, RefineError};
pub use pipeline::{PipelineResult, Refiner, Stage};
pub use records::ActivityRecord;
