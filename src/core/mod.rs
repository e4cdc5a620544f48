pub mod config;
pub mod error;
pub mod types;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use types::{
    CheckId, CheckType, Degree, HexId, InstanceId, KingdomPhase, PreviewId, ResourceKind, Turn,
};
