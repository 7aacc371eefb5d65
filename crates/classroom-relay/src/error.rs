/// Reasons the relay refuses to dispatch a client frame.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("not in a room")]
    NotInRoom,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("unsupported frame: {0}")]
    Unsupported(&'static str),
}
