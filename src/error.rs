use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("No frames could be extracted from the video")]
    NoFrames,

    #[error("Analysis failed: {source}")]
    AnalysisFailed {
        #[source]
        source: Box<ForensicsError>,
    },

    #[error("Detector '{detector}' failed: {reason}")]
    DetectorFailed { detector: String, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Image too small for analysis (minimum: {0}x{0})")]
    ImageTooSmall(u32),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ForensicsError {
    /// Wraps an unrecovered fault for the caller. Cancellation passes through
    /// untouched and already-wrapped errors are not wrapped twice.
    pub fn into_analysis_failure(self) -> Self {
        match self {
            ForensicsError::Cancelled | ForensicsError::AnalysisFailed { .. } => self,
            other => ForensicsError::AnalysisFailed {
                source: Box::new(other),
            },
        }
    }

    pub fn root_cause(&self) -> &ForensicsError {
        match self {
            ForensicsError::AnalysisFailed { source } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_decode_error(&self) -> bool {
        matches!(
            self.root_cause(),
            ForensicsError::Decode(_) | ForensicsError::ImageLoad(_)
        )
    }

    pub fn is_no_frames(&self) -> bool {
        matches!(self.root_cause(), ForensicsError::NoFrames)
    }
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
