pub mod clock;
pub mod prompt;
pub mod record;
pub mod response;

pub use clock::{parse_timezone, ClockError, LocalZone, RunClock, DEFAULT_MARKET_TIMEZONE};
pub use prompt::build_prompt;
pub use record::AnalysisRecord;
pub use response::{ApiResponse, ChatCompletion};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis api returned status {status}")]
    Http { status: u16, body: String },
    #[error("analysis request failed: {0}")]
    Transport(String),
    #[error("analysis response is not valid json: {0}")]
    Decode(String),
}

/// Remote image-understanding service.
pub trait VisionAnalyzer {
    fn analyze(&self, image: &[u8], prompt: &str) -> Result<ApiResponse, AnalysisError>;
}
