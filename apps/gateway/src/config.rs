/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HS256 secret shared with the service that issues bearer tokens.
    pub jwt_secret: String,
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Capacity of each connection's outbound queue. Events for a peer whose
    /// queue is full are dropped.
    pub outbound_buffer: usize,
    /// Seconds a fresh connection has to authenticate before it is closed.
    pub auth_timeout_secs: u64,
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,
    /// `(room_id, owner_user_id)` pairs seeded into the stream directory.
    pub room_owners: Vec<(String, String)>,
}

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 25;

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            port: parsed_var("PORT").unwrap_or(DEFAULT_PORT),
            outbound_buffer: parsed_var("OUTBOUND_BUFFER")
                .unwrap_or(DEFAULT_OUTBOUND_BUFFER)
                .max(1),
            auth_timeout_secs: parsed_var("AUTH_TIMEOUT_SECS").unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS),
            ping_interval_secs: parsed_var("PING_INTERVAL_SECS")
                .unwrap_or(DEFAULT_PING_INTERVAL_SECS)
                .max(1),
            room_owners: std::env::var("ROOM_OWNERS")
                .map(|v| parse_room_owners(&v))
                .unwrap_or_default(),
        }
    }

    /// Defaults for everything except the secret. Used by tests and embedders.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            port: DEFAULT_PORT,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            auth_timeout_secs: DEFAULT_AUTH_TIMEOUT_SECS,
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            room_owners: Vec::new(),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse `room:owner,room:owner`. Malformed pairs are skipped with a warning.
pub fn parse_room_owners(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| match pair.split_once(':') {
            Some((room, owner)) if !room.trim().is_empty() && !owner.trim().is_empty() => {
                Some((room.trim().to_string(), owner.trim().to_string()))
            }
            _ => {
                tracing::warn!(%pair, "ignoring malformed ROOM_OWNERS entry");
                None
            }
        })
        .collect()
}
