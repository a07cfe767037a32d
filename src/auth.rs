//! Auth-domain identifiers and the access token model.

pub mod id;
pub mod token;

pub use id::*;
pub use token::{kind::*, record::*, secret::*};
