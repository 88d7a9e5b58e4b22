/// Application name
pub const APP_NAME: &str = "SafeWatch";

/// Default HTTP/WebSocket port (server)
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Path of the WebSocket presence channel
pub const WS_PATH: &str = "/ws";

/// Outbound events queued per connection before new ones are dropped
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Longest accepted user identifier, in bytes
pub const MAX_USER_ID_LEN: usize = 128;

/// Longest accepted display name, in bytes
pub const MAX_DISPLAY_NAME_LEN: usize = 256;
