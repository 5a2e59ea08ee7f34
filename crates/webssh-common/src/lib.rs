pub mod errors;
pub mod id;

pub use errors::{ConfigError, GatewayError};
pub use id::{SessionId, ShortId};
