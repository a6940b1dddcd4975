use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device roster error: {0}")]
    Roster(String),

    #[error("Roster decryption failed: wrong pass-phrase or corrupt ciphertext")]
    Decrypt,

    #[error("Device roster contains no valid devices")]
    EmptyRoster,

    #[error("Device interface unavailable: {0}")]
    InterfaceUnavailable(String),

    #[error("Device interface failed for {node}: {reason}")]
    DeviceInterface { node: String, reason: String },

    #[error("Output error: {0}")]
    Output(String),

    #[error("Push failed: {0}")]
    Push(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    /// Errors that stop a run before any device is polled.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            ExporterError::Config(_)
                | ExporterError::Roster(_)
                | ExporterError::Decrypt
                | ExporterError::EmptyRoster
                | ExporterError::InterfaceUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
