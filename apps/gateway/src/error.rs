/// Everything that can go wrong while serving a gateway operation.
///
/// The `Display` text is what clients see in an `error{message}` (or
/// `authentication-failed{reason}`) event, so keep it user-facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Bad or missing credential. Terminal for the connection.
    #[error("{0}")]
    Auth(String),

    /// Operation attempted before `authenticate` succeeded.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// A second `authenticate` on a connection whose identity is already set.
    #[error("Already authenticated")]
    AlreadyAuthenticated,

    /// A collaborator refused the operation for this caller.
    #[error("{0}")]
    Forbidden(String),

    /// A collaborator does not know the referenced room or stream.
    #[error("{0}")]
    NotFound(String),

    /// The client frame could not be understood.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A well-formed request with an unusable value.
    #[error("{0}")]
    BadRequest(String),

    /// The connection is no longer registered (already closed).
    #[error("Unknown connection")]
    UnknownConnection,
}

impl GatewayError {
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Whether this error ends the connection instead of being reported on it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
