//! Client-side OAuth 2.0 session manager: single-flight token exchanges, FIFO replay of
//! operations that wait for a token, signed browser URLs, and pluggable secure stores.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod obs;
pub mod redirect;
pub mod session;
pub mod store;
pub mod transport;
pub mod urls;

#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Re-exports, fixtures, and a scripted transport shared by unit and integration tests;
	//! enabled via `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// crates.io
	use tokio::sync::{Notify, Semaphore};
	// self
	#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestHttpClient};
	use crate::{
		auth::{TokenSecret, UserId},
		client::Client,
		config::ClientConfig,
		store::{MemoryStore, SecureStore},
		transport::{
			AuthorizationTransport, ExchangeRequest, FailureKind, TokenGrant, TransportFailure,
			TransportFuture,
		},
	};

	/// Client identifier used by the fixtures.
	pub const CLIENT_ID: &str = "c1";
	/// Server URL used by the fixtures.
	pub const SERVER_URL: &str = "https://id.example.com";
	/// App URL scheme used by the fixtures.
	pub const APP_SCHEME: &str = "myapp";

	/// Canned reply for one exchange.
	#[derive(Clone, Debug)]
	pub enum Scripted {
		/// Return the grant.
		Grant(TokenGrant),
		/// Return the failure.
		Fail(TransportFailure),
		/// Never answer.
		Hang,
	}

	/// In-process [`AuthorizationTransport`] answering from queued scripts.
	///
	/// A gated transport parks every exchange until [`ScriptedTransport::release`] hands out a
	/// permit, which lets tests pile callers up behind one in-flight exchange.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		exchanges: Mutex<VecDeque<Scripted>>,
		one_time_codes: Mutex<VecDeque<Result<String, TransportFailure>>>,
		revoke_failure: Mutex<Option<TransportFailure>>,
		requests: Mutex<Vec<ExchangeRequest>>,
		revoked: Mutex<Vec<TokenSecret>>,
		gate: Option<Semaphore>,
		started: Notify,
	}
	impl ScriptedTransport {
		/// Transport that answers immediately.
		pub fn new() -> Arc<Self> {
			Arc::new(Self::default())
		}

		/// Transport whose exchanges wait for [`ScriptedTransport::release`].
		pub fn gated() -> Arc<Self> {
			Arc::new(Self { gate: Some(Semaphore::new(0)), ..Default::default() })
		}

		/// Queues a reply.
		pub fn push(&self, reply: Scripted) -> &Self {
			self.exchanges.lock().push_back(reply);

			self
		}

		/// Queues a successful grant.
		pub fn push_grant(&self, grant: TokenGrant) -> &Self {
			self.push(Scripted::Grant(grant))
		}

		/// Queues a failure.
		pub fn push_failure(&self, kind: FailureKind, detail: &str) -> &Self {
			self.push(Scripted::Fail(TransportFailure::new(kind, detail)))
		}

		/// Queues a one-time code reply.
		pub fn push_one_time_code(&self, reply: Result<String, TransportFailure>) -> &Self {
			self.one_time_codes.lock().push_back(reply);

			self
		}

		/// Makes every later revocation fail.
		pub fn fail_revocations(&self, failure: TransportFailure) {
			*self.revoke_failure.lock() = Some(failure);
		}

		/// Lets `n` gated exchanges proceed.
		pub fn release(&self, n: usize) {
			if let Some(gate) = &self.gate {
				gate.add_permits(n);
			}
		}

		/// Waits until an exchange has reached the transport.
		pub async fn wait_started(&self) {
			self.started.notified().await;
		}

		/// Number of exchanges that reached the transport.
		pub fn exchange_count(&self) -> usize {
			self.requests.lock().len()
		}

		/// Exchanges that reached the transport, in order.
		pub fn requests(&self) -> Vec<ExchangeRequest> {
			self.requests.lock().clone()
		}

		/// Access values passed to revocation, in order.
		pub fn revoked(&self) -> Vec<String> {
			self.revoked.lock().iter().map(|secret| secret.expose().to_owned()).collect()
		}
	}
	impl AuthorizationTransport for ScriptedTransport {
		fn exchange(&self, request: ExchangeRequest) -> TransportFuture<'_, TokenGrant> {
			Box::pin(async move {
				self.requests.lock().push(request);
				self.started.notify_one();

				if let Some(gate) = &self.gate {
					gate.acquire()
						.await
						.map_err(|e| TransportFailure::new(FailureKind::Network, e.to_string()))?
						.forget();
				}

				let reply = self.exchanges.lock().pop_front();

				match reply {
					Some(Scripted::Grant(grant)) => Ok(grant),
					Some(Scripted::Fail(failure)) => Err(failure),
					Some(Scripted::Hang) => std::future::pending().await,
					None => Err(TransportFailure::new(FailureKind::Rejected, "no scripted reply")),
				}
			})
		}

		fn revoke<'a>(&'a self, access_token: &'a TokenSecret) -> TransportFuture<'a, ()> {
			Box::pin(async move {
				self.revoked.lock().push(access_token.clone());

				match self.revoke_failure.lock().clone() {
					Some(failure) => Err(failure),
					None => Ok(()),
				}
			})
		}

		fn one_time_code<'a>(&'a self, _: &'a TokenSecret) -> TransportFuture<'a, String> {
			Box::pin(async move {
				self.one_time_codes.lock().pop_front().unwrap_or_else(|| {
					Err(TransportFailure::new(FailureKind::Rejected, "no scripted code"))
				})
			})
		}
	}

	/// `c1` / `https://id.example.com` / `myapp` configuration.
	pub fn fixture_config() -> ClientConfig {
		let server = Url::parse(SERVER_URL).unwrap_or_else(|e| panic!("Invalid fixture URL: {e}"));

		ClientConfig::new(CLIENT_ID, "s1", APP_SCHEME, server)
	}

	/// User-scoped grant carrying a refresh value.
	pub fn user_grant(access: &str, refresh: &str, user: &str, expires_in: Duration) -> TokenGrant {
		let id = UserId::new(user).unwrap_or_else(|e| panic!("Invalid fixture user: {e}"));

		TokenGrant::new(access, expires_in).with_refresh_token(refresh).with_user_id(id)
	}

	/// Builds a client over the scripted transport and a fresh memory store.
	pub fn scripted_client(
		config: ClientConfig,
		transport: Arc<ScriptedTransport>,
	) -> (Client, Arc<MemoryStore>) {
		let store = Arc::new(MemoryStore::default());
		let client = Client::new(config, transport, store.clone() as Arc<dyn SecureStore>);

		(client, store)
	}

	/// Reqwest client accepting the self-signed certificates served by `httpmock`.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> Result<ReqwestHttpClient, ConfigError> {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.map_err(ConfigError::http_client_build)?;

		Ok(ReqwestHttpClient::with_client(client))
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use httpmock as _;
