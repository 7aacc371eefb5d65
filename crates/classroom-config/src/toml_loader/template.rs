/// Default TOML config content with comments.
pub(crate) fn default_config_toml() -> &'static str {
    r##"# Classroom Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[relay]
# bind = "0.0.0.0"
# port = 8080                 # 1-65535
# channel_capacity = 256      # outbound frames queued per connection
# stats_interval_secs = 60    # 0 disables room statistics logging

[client]
# url = "ws://127.0.0.1:8080"
# connect_timeout_secs = 15   # 1-120
# reconnect_delay_secs = 1    # 1-60, doubled after each failed attempt
# max_reconnect_delay_secs = 30
# ice_servers = ["stun:stun.l.google.com:19302"]

[media]
# audio = true
# video = true
# camera_device = "default"
# start_muted = false
# start_video_off = false

[logging]
# level = "info"              # trace, debug, info, warn, error
"##
}
