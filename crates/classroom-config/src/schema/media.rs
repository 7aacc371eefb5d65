use serde::{Deserialize, Serialize};

/// Local media defaults applied when joining a classroom.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub audio: bool,
    pub video: bool,
    /// Camera device id; `None` lets the platform pick.
    pub camera_device: Option<String>,
    pub start_muted: bool,
    pub start_video_off: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            camera_device: None,
            start_muted: false,
            start_video_off: false,
        }
    }
}
