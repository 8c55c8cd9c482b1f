pub mod error;
pub mod event;
pub mod request;

pub use error::{
    ErrorCode, FailureClassifier, FailureKind, ForgeError, ProviderFailure, Result,
    ValidationError,
};
pub use event::{AnalysisResult, StreamEvent};
pub use request::{AnalysisPayload, AnalysisRequest, Backend};
