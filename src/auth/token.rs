//! Access token record, scope flavor, and redacted secret wrappers.

pub mod kind;
pub mod record;
pub mod secret;
