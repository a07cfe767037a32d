// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::sync::{Notify, Semaphore};
// self
use oauth2_session::{
	_preludet::*,
	auth::{AccessToken, TokenSecret},
	client::Client,
	config::RefreshPolicy,
	session::LifecycleState,
	store::{MemoryStore, SecureStore, StoreFuture},
	transport::{ExchangeRequest, FailureKind, TokenGrant},
};

type Order = Arc<Mutex<Vec<usize>>>;

/// Memory store whose saves can be held open until the test lets them finish.
#[derive(Default)]
struct HeldStore {
	inner: MemoryStore,
	hold: Mutex<Option<Arc<Semaphore>>>,
	saving: Notify,
}
impl HeldStore {
	fn hold_saves(&self) -> Arc<Semaphore> {
		let gate = Arc::new(Semaphore::new(0));

		*self.hold.lock() = Some(gate.clone());

		gate
	}
}
impl SecureStore for HeldStore {
	fn save<'a>(&'a self, key: &'a str, token: AccessToken) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let hold = self.hold.lock().clone();

			if let Some(gate) = hold {
				self.saving.notify_one();

				let _permit = gate.acquire().await;
			}

			self.inner.save(key, token).await
		})
	}

	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AccessToken>> {
		self.inner.load(key)
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		self.inner.remove(key)
	}
}

async fn login_expired(client: &Client, transport: &ScriptedTransport) {
	transport.push_grant(user_grant("tok1", "ref1", "u42", Duration::seconds(30)));
	transport.release(1);
	client.login("authcode123").await.expect("Login should succeed.");
	transport.wait_started().await;

	assert_eq!(client.state(), LifecycleState::Expired);
}

fn spawn_recorded(
	client: &Client,
	order: &Order,
	idx: usize,
) -> tokio::task::JoinHandle<Result<String>> {
	let client = client.clone();
	let order = order.clone();

	tokio::spawn(async move {
		client
			.run_authorized(move |token: AccessToken| {
				order.lock().push(idx);

				async move { token.access_token.expose().to_owned() }
			})
			.await
	})
}

async fn wait_pending(client: &Client, expected: usize) {
	while client.session().pending_operations() < expected {
		tokio::task::yield_now().await;
	}
}

fn refresh_count(transport: &ScriptedTransport) -> usize {
	transport
		.requests()
		.iter()
		.filter(|request| matches!(request, ExchangeRequest::Refresh { .. }))
		.count()
}

#[tokio::test]
async fn queued_operations_share_one_refresh_and_run_in_order() {
	let transport = ScriptedTransport::gated();
	let (client, store) = scripted_client(fixture_config(), transport.clone());
	let order = Order::default();

	login_expired(&client, &transport).await;
	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));

	let first = spawn_recorded(&client, &order, 0);

	transport.wait_started().await;
	wait_pending(&client, 1).await;

	let second = spawn_recorded(&client, &order, 1);

	wait_pending(&client, 2).await;

	let third = spawn_recorded(&client, &order, 2);

	wait_pending(&client, 3).await;

	assert_eq!(client.state(), LifecycleState::Refreshing);

	transport.release(1);

	for handle in [first, second, third] {
		let seen = handle
			.await
			.expect("Task should not panic.")
			.expect("Queued operation should run with the new token.");

		assert_eq!(seen, "tok2");
	}

	assert_eq!(*order.lock(), vec![0, 1, 2]);
	assert_eq!(refresh_count(&transport), 1);
	assert_eq!(client.session().pending_operations(), 0);
	assert_eq!(client.state(), LifecycleState::Authorized);
	assert_eq!(client.metrics().queued(), 3);
	assert_eq!(client.metrics().replayed(), 3);
	assert_eq!(
		store.get(&client.config().store_key).map(|token| token.access_token.expose().to_owned()),
		Some("tok2".into()),
	);
}

#[tokio::test]
async fn operations_wait_for_an_in_flight_login() {
	let transport = ScriptedTransport::gated();
	let (client, store) = scripted_client(fixture_config(), transport.clone());
	let order = Order::default();

	transport.push_grant(user_grant("tok1", "ref1", "u42", Duration::hours(1)));

	let login_client = client.clone();
	let login = tokio::spawn(async move { login_client.login("authcode123").await });

	transport.wait_started().await;

	assert_eq!(client.state(), LifecycleState::Refreshing);
	assert!(!client.is_authorized());

	let first = spawn_recorded(&client, &order, 0);

	wait_pending(&client, 1).await;

	let second = spawn_recorded(&client, &order, 1);

	wait_pending(&client, 2).await;

	let third = spawn_recorded(&client, &order, 2);

	wait_pending(&client, 3).await;
	transport.release(1);

	let token = login.await.expect("Task should not panic.").expect("Login should succeed.");

	assert_eq!(token.access_token.expose(), "tok1");

	for handle in [first, second, third] {
		let seen = handle
			.await
			.expect("Task should not panic.")
			.expect("Queued operation should run with the login token.");

		assert_eq!(seen, "tok1");
	}

	assert_eq!(*order.lock(), vec![0, 1, 2]);
	assert_eq!(transport.exchange_count(), 1);
	assert_eq!(client.metrics().queued(), 3);
	assert_eq!(client.metrics().replayed(), 3);
	assert_eq!(client.state(), LifecycleState::Authorized);
	assert!(store.get(&client.config().store_key).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operations_arriving_during_replay_run_after_the_queue() {
	let transport = ScriptedTransport::gated();
	let (client, _store) = scripted_client(fixture_config(), transport.clone());
	let order = Order::default();
	let late = Arc::new(Mutex::new(None));

	login_expired(&client, &transport).await;
	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));

	let first = {
		let runner = client.clone();
		let client = client.clone();
		let order = order.clone();
		let late = late.clone();

		tokio::spawn(async move {
			runner
				.run_authorized(move |token: AccessToken| {
					order.lock().push(0);
					*late.lock() = Some(spawn_recorded(&client, &order, 3));

					async move { token.access_token.expose().to_owned() }
				})
				.await
		})
	};

	transport.wait_started().await;
	wait_pending(&client, 1).await;

	let second = spawn_recorded(&client, &order, 1);

	wait_pending(&client, 2).await;

	let third = spawn_recorded(&client, &order, 2);

	wait_pending(&client, 3).await;
	transport.release(1);

	for handle in [first, second, third] {
		let seen = handle
			.await
			.expect("Task should not panic.")
			.expect("Queued operation should run with the new token.");

		assert_eq!(seen, "tok2");
	}

	let late = late.lock().take().expect("Replay should have started the late call.");
	let seen = late
		.await
		.expect("Task should not panic.")
		.expect("Late call should run with the installed token.");

	assert_eq!(seen, "tok2");
	assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
	assert_eq!(refresh_count(&transport), 1);
	assert_eq!(client.metrics().queued(), 3);
}

#[tokio::test]
async fn rejected_refresh_fails_every_queued_operation() {
	let transport = ScriptedTransport::gated();
	let (client, store) = scripted_client(fixture_config(), transport.clone());
	let order = Order::default();

	login_expired(&client, &transport).await;
	transport.push_failure(FailureKind::InvalidCredential, "refresh token revoked");

	let first = spawn_recorded(&client, &order, 0);

	transport.wait_started().await;
	wait_pending(&client, 1).await;

	let second = spawn_recorded(&client, &order, 1);

	wait_pending(&client, 2).await;
	transport.release(1);

	for handle in [first, second] {
		let err = handle
			.await
			.expect("Task should not panic.")
			.expect_err("Queued operation should observe the failure.");

		assert!(matches!(
			err,
			Error::RefreshFailed(ref failure) if failure.kind == FailureKind::InvalidCredential
		));
		assert!(err.requires_login());
	}

	assert!(order.lock().is_empty());
	assert_eq!(refresh_count(&transport), 1);
	assert_eq!(client.session().pending_operations(), 0);
	assert_eq!(client.state(), LifecycleState::Unauthorized);
	assert!(!client.is_authorized());
	assert!(store.get(&client.config().store_key).is_none());
	assert_eq!(
		client.run_authorized(|_| async {}).await,
		Err(Error::NotAuthorized),
		"Without a refresh value there is no path to a token.",
	);
}

#[tokio::test(start_paused = true)]
async fn timed_out_refresh_keeps_the_refresh_value_for_the_next_call() {
	let transport = ScriptedTransport::new();
	let config = fixture_config().with_exchange_timeout(Duration::seconds(5));
	let (client, _store) = scripted_client(config, transport.clone());

	transport.push_grant(user_grant("tok1", "ref1", "u42", Duration::seconds(30)));
	client.login("authcode123").await.expect("Login should succeed.");
	transport.push(Scripted::Hang);

	let err = client
		.run_authorized(|token: AccessToken| async move { token })
		.await
		.expect_err("Hung refresh should time out.");

	assert!(matches!(
		err,
		Error::RefreshFailed(ref failure) if failure.kind == FailureKind::Timeout
	));
	assert!(err.is_transient());
	assert_eq!(client.state(), LifecycleState::Unauthorized);
	assert!(client.current_token().is_err());

	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));

	let token = client
		.run_authorized(|token: AccessToken| async move { token })
		.await
		.expect("Next call should retry with the kept refresh value.");

	assert_eq!(token.access_token.expose(), "tok2");
	assert_eq!(token.user_id().map(|id| id.as_ref()), Some("u42"));
	assert_eq!(
		transport.requests()[2],
		ExchangeRequest::Refresh { refresh_token: TokenSecret::new("ref1") },
	);
	assert_eq!(transport.exchange_count(), 3);
}

#[tokio::test]
async fn logout_during_refresh_wins() {
	let transport = ScriptedTransport::gated();
	let (client, store) = scripted_client(fixture_config(), transport.clone());
	let order = Order::default();

	login_expired(&client, &transport).await;

	assert!(store.get(&client.config().store_key).is_some());

	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));

	let queued = spawn_recorded(&client, &order, 0);

	transport.wait_started().await;
	wait_pending(&client, 1).await;

	let previous = client.logout().await.expect("Logout should return the held token.");

	assert_eq!(previous.access_token.expose(), "tok1");
	assert_eq!(transport.revoked(), vec!["tok1".to_owned()]);

	transport.release(1);

	assert_eq!(queued.await.expect("Task should not panic."), Err(Error::LoggedOut));
	assert!(order.lock().is_empty());
	assert_eq!(client.state(), LifecycleState::Unauthorized);
	assert!(client.current_token().is_err());
	assert!(store.get(&client.config().store_key).is_none());
	assert_eq!(client.metrics().discarded(), 1);
}

#[tokio::test]
async fn logout_during_persist_leaves_the_store_empty() {
	let transport = ScriptedTransport::gated();
	let store = Arc::new(HeldStore::default());
	let client =
		Client::new(fixture_config(), transport.clone(), store.clone() as Arc<dyn SecureStore>);
	let key = client.config().store_key.clone();

	login_expired(&client, &transport).await;

	assert!(store.inner.get(&key).is_some());

	let saves = store.hold_saves();

	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));

	let refresher = client.clone();
	let refresh = tokio::spawn(async move { refresher.refresh().await });

	transport.wait_started().await;
	transport.release(1);
	store.saving.notified().await;

	assert_eq!(client.state(), LifecycleState::Authorized);

	let leaver = client.clone();
	let logout = tokio::spawn(async move { leaver.logout().await });

	while client.state() != LifecycleState::Unauthorized {
		tokio::task::yield_now().await;
	}

	saves.add_permits(1);

	let previous = logout
		.await
		.expect("Task should not panic.")
		.expect("Logout should return the installed token.");
	let refreshed = refresh
		.await
		.expect("Task should not panic.")
		.expect("Refresh settled before the logout.");

	assert_eq!(previous.access_token.expose(), "tok2");
	assert_eq!(refreshed.access_token.expose(), "tok2");
	assert_eq!(transport.revoked(), vec!["tok2".to_owned()]);
	assert!(store.inner.get(&key).is_none(), "Logout's removal must land after the save.");
	assert!(client.current_token().is_err());
	assert_eq!(client.metrics().discarded(), 0);
}

#[tokio::test]
async fn concurrent_refreshes_share_the_flight() {
	let transport = ScriptedTransport::gated();
	let (client, _store) = scripted_client(fixture_config(), transport.clone());

	login_expired(&client, &transport).await;
	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));

	let racer = client.clone();
	let first = tokio::spawn(async move { racer.refresh().await });

	transport.wait_started().await;

	let racer = client.clone();
	let second = tokio::spawn(async move { racer.refresh().await });

	tokio::task::yield_now().await;
	transport.release(1);

	let first = first.await.expect("Task should not panic.").expect("Refresh should succeed.");
	let second =
		second.await.expect("Task should not panic.").expect("Joined refresh should succeed.");

	assert_eq!(first, second);
	assert_eq!(refresh_count(&transport), 1);
}

#[tokio::test]
async fn login_during_refresh_makes_its_own_exchange() {
	let transport = ScriptedTransport::gated();
	let (client, _store) = scripted_client(fixture_config(), transport.clone());

	login_expired(&client, &transport).await;
	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));
	transport.push_grant(user_grant("tok3", "ref3", "u7", Duration::hours(1)));

	let refresher = client.clone();
	let refresh = tokio::spawn(async move { refresher.refresh().await });

	transport.wait_started().await;

	let login_client = client.clone();
	let login = tokio::spawn(async move { login_client.login("c2").await });

	tokio::task::yield_now().await;
	transport.release(2);

	let refreshed =
		refresh.await.expect("Task should not panic.").expect("Refresh should succeed.");
	let logged_in = login.await.expect("Task should not panic.").expect("Login should succeed.");

	assert_eq!(refreshed.access_token.expose(), "tok2");
	assert_eq!(logged_in.access_token.expose(), "tok3");
	assert_eq!(logged_in.user_id().map(|id| id.as_ref()), Some("u7"));
	assert_eq!(transport.exchange_count(), 3);
	assert_eq!(
		transport.requests()[2],
		ExchangeRequest::AuthorizationCode {
			code: TokenSecret::new("c2"),
			redirect_uri: Url::parse("myapp://spid/login").expect("Redirect should parse."),
		},
	);
}

#[tokio::test]
async fn operations_run_immediately_with_a_valid_token() {
	let transport = ScriptedTransport::new();
	let (client, _store) = scripted_client(fixture_config(), transport.clone());

	transport.push_grant(user_grant("tok1", "ref1", "u42", Duration::hours(1)));
	client.login("authcode123").await.expect("Login should succeed.");

	let seen = client
		.run_authorized(|token: AccessToken| async move { token.access_token.expose().to_owned() })
		.await
		.expect("Authorized call should run.");

	assert_eq!(seen, "tok1");
	assert_eq!(transport.exchange_count(), 1);
	assert_eq!(client.metrics().queued(), 0);
}

#[tokio::test]
async fn client_credentials_fallback_acquires_without_a_token() {
	let transport = ScriptedTransport::new();
	let config = fixture_config().with_client_credentials_fallback(true);
	let (client, _store) = scripted_client(config, transport.clone());

	transport.push_grant(TokenGrant::new("app1", Duration::hours(1)));

	let seen = client
		.run_authorized(|token: AccessToken| async move { token.is_client_token() })
		.await
		.expect("Fallback should obtain a client token.");

	assert!(seen);
	assert_eq!(transport.requests(), vec![ExchangeRequest::ClientCredentials]);
}

#[tokio::test(start_paused = true)]
async fn eager_policy_refreshes_before_expiry() {
	let transport = ScriptedTransport::new();
	let config = fixture_config().with_refresh_policy(RefreshPolicy::Eager);
	let (client, _store) = scripted_client(config, transport.clone());

	transport.push_grant(user_grant("tok1", "ref1", "u42", Duration::seconds(62)));
	transport.push_grant(user_grant("tok2", "ref2", "u42", Duration::hours(1)));
	client.login("authcode123").await.expect("Login should succeed.");

	assert_eq!(client.state(), LifecycleState::Authorized);

	tokio::time::sleep(StdDuration::from_secs(3)).await;

	while transport.exchange_count() < 2
		|| client.current_token().map(|token| token.access_token.expose().to_owned())
			!= Ok("tok2".into())
	{
		tokio::task::yield_now().await;
	}

	assert_eq!(refresh_count(&transport), 1);
	assert!(!client.has_expired());
}
