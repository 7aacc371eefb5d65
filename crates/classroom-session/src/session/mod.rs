//! Classroom session manager.
//!
//! One actor task per joined room owns the peer connections, the remote
//! roster and the local devices. The application drives it through
//! [`ClassroomSession`] and observes it through [`ClassroomEvent`]s.

mod manager;
mod types;

pub use manager::{acquire_local_media, ClassroomSession};
pub use types::{ClassroomEvent, JoinOptions, Participant};
