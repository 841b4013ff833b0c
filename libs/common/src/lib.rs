pub mod id;
pub mod identity;

pub use id::{ConnectionId, PrefixedId};
pub use identity::UserIdentity;
