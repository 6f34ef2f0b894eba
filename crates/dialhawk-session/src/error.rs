use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The transcription connection failed and the single reconnect
    /// attempt also failed. Fatal for the session.
    #[error("transcription connection lost: {0}")]
    TranscriptionLost(String),

    /// The outbound transport went away mid-send. Fatal for the session.
    #[error("transport closed: {0}")]
    Transport(String),
}
