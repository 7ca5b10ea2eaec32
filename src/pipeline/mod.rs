//! Document analysis pipeline and its background scheduler.

pub mod extract;
pub mod scheduler;
mod service;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;

pub use extract::{PdfTextExtractor, TextExtractor, join_pages};
pub use scheduler::{AnalysisApi, AnalysisScheduler};
pub use service::{AnalysisService, InitError};
pub use types::{
    AnalysisRequest, AnalysisResult, AnnotationError, ExtractionError, PersistenceError,
    PipelineError, RetrievalError,
};
