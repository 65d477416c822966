//! Bearer credential model: the redacted secret, its decoded claims, and sign-in payloads.

pub mod claims;
pub mod credential;
pub mod secret;

pub use claims::*;
pub use credential::*;
pub use secret::*;
