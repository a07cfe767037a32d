//! Token flavor: issued for a signed-in user or for the application itself.

// self
use crate::{_prelude::*, auth::UserId};

/// Whether a token acts on behalf of a user or of the client application.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenKind {
	/// Token issued after a user signed in.
	User {
		/// User the token belongs to.
		id: UserId,
	},
	/// Application-level token from the client credentials grant.
	Client,
}
impl TokenKind {
	/// Returns the user identifier for user-scoped tokens.
	pub fn user_id(&self) -> Option<&UserId> {
		match self {
			Self::User { id } => Some(id),
			Self::Client => None,
		}
	}

	/// Returns `true` for application-level tokens.
	pub fn is_client(&self) -> bool {
		matches!(self, Self::Client)
	}
}
