use tokio_tungstenite::tungstenite;

/// Failures that end a relay session before forwarding starts. The
/// `Display` text is what the client sees in its error frame.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Voice service credential is not configured")]
    MissingCredential,
    #[error("Voice service resource name is not configured")]
    MissingResource,
    #[error("Agent project name is not configured")]
    MissingProjectName,
    #[error("Failed to connect to voice service: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error("Voice service connection error: {0}")]
    Protocol(String),
    #[error("Failed to encode session configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}
