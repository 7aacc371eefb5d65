pub mod errors;
pub mod id;
pub mod protocol;

pub use errors::{ClassroomError, ConfigError, MediaError, PeerError, SignalingError};
pub use id::new_id;
pub use protocol::{ClientMessage, MemberInfo, ServerMessage, Signal};

pub type Result<T> = std::result::Result<T, ClassroomError>;
