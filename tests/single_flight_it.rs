mod common;

// std
use std::sync::Arc;
// crates.io
use http::StatusCode;
// self
use bearer_session::{auth::Credential, error::RenewalError, session::SessionState};
use common::*;

async fn wait_for_joins(session: &bearer_session::session::Session, joins: u64) {
	while session.coordinator().metrics().joins() < joins {
		tokio::task::yield_now().await;
	}
}

#[tokio::test]
async fn concurrent_renewals_make_one_remote_call() {
	let endpoint = GatedEndpoint::new(Ok(Credential::from_token("fresh")));
	let ui = Arc::new(RecordingUi::default());
	let session = signed_in_session(endpoint.clone(), ui, "stale").await;
	let callers = (0..8)
		.map(|_| {
			let session = session.clone();

			tokio::spawn(async move { session.renew().await })
		})
		.collect::<Vec<_>>();

	wait_for_joins(&session, 7).await;

	assert_eq!(session.state(), SessionState::RenewalInFlight);

	endpoint.release();

	for caller in callers {
		let credential = caller
			.await
			.expect("Renewal task should not panic.")
			.expect("Every caller should observe the shared success.");

		assert_eq!(credential.secret().expose(), "fresh");
	}

	assert_eq!(endpoint.calls(), 1);
	assert_eq!(session.coordinator().metrics().attempts(), 1);
	assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn concurrent_renewals_share_one_failure() {
	let endpoint = GatedEndpoint::new(Err(RenewalError::Rejected { status: 401 }));
	let ui = Arc::new(RecordingUi::default());
	let session = signed_in_session(endpoint.clone(), ui.clone(), "stale").await;
	let callers = (0..4)
		.map(|_| {
			let session = session.clone();

			tokio::spawn(async move { session.renew().await })
		})
		.collect::<Vec<_>>();

	wait_for_joins(&session, 3).await;
	endpoint.release();

	for caller in callers {
		let outcome = caller.await.expect("Renewal task should not panic.");

		assert!(matches!(outcome, Err(RenewalError::Rejected { status: 401 })));
	}

	assert_eq!(endpoint.calls(), 1);
	assert!(session.credential().is_none());
	assert_eq!(session.state(), SessionState::Invalid);
	assert_eq!(ui.notices(), 0);
}

#[tokio::test]
async fn simultaneous_rejections_replay_once_with_renewed_credential() {
	let endpoint = GatedEndpoint::new(Ok(Credential::from_token("fresh")));
	let ui = Arc::new(RecordingUi::default());
	let session = signed_in_session(endpoint.clone(), ui.clone(), "stale").await;
	let transport = TokenGate::new(Some("fresh"), 3);
	let client = session.client(transport.clone());
	let requests = (0..3)
		.map(|_| {
			let client = client.clone();

			tokio::spawn(async move { client.send(items_request()).await })
		})
		.collect::<Vec<_>>();

	wait_for_joins(&session, 2).await;
	endpoint.release();

	for request in requests {
		let response = request
			.await
			.expect("Request task should not panic.")
			.expect("Request should complete.");

		assert_eq!(response.status, StatusCode::OK);
	}

	assert_eq!(endpoint.calls(), 1);
	assert_eq!(transport.count("Bearer stale"), 3);
	assert_eq!(transport.count("Bearer fresh"), 3);
	assert_eq!(transport.seen().len(), 6);
	assert_eq!(ui.notices(), 0);
}

#[tokio::test]
async fn replays_are_not_retried_when_rejected_again() {
	let endpoint = GatedEndpoint::new(Ok(Credential::from_token("fresh")));
	let ui = Arc::new(RecordingUi::default());
	let session = signed_in_session(endpoint.clone(), ui.clone(), "stale").await;
	let transport = TokenGate::new(None, 3);
	let client = session.client(transport.clone());
	let requests = (0..3)
		.map(|_| {
			let client = client.clone();

			tokio::spawn(async move { client.send(items_request()).await })
		})
		.collect::<Vec<_>>();

	wait_for_joins(&session, 2).await;
	endpoint.release();

	for request in requests {
		let response = request
			.await
			.expect("Request task should not panic.")
			.expect("Request should complete.");

		assert_eq!(response.status, StatusCode::UNAUTHORIZED);
	}

	assert_eq!(endpoint.calls(), 1);
	assert_eq!(transport.count("Bearer fresh"), 3);
	assert_eq!(transport.seen().len(), 6);
	assert_eq!(ui.notices(), 0);
	assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn requests_wait_for_an_in_flight_renewal_before_sending() {
	let endpoint = GatedEndpoint::new(Ok(Credential::from_token("fresh")));
	let ui = Arc::new(RecordingUi::default());
	let session = signed_in_session(endpoint.clone(), ui, "stale").await;
	let transport = TokenGate::new(Some("fresh"), 1);
	let renewal = tokio::spawn({
		let session = session.clone();

		async move { session.renew().await }
	});

	while !session.coordinator().is_in_flight() {
		tokio::task::yield_now().await;
	}

	let request = tokio::spawn({
		let client = session.client(transport.clone());

		async move { client.send(items_request()).await }
	});

	wait_for_joins(&session, 1).await;

	assert!(transport.seen().is_empty());

	endpoint.release();

	let response = request
		.await
		.expect("Request task should not panic.")
		.expect("Request should complete.");

	renewal.await.expect("Renewal task should not panic.").expect("Renewal should succeed.");

	assert_eq!(response.status, StatusCode::OK);
	assert_eq!(transport.seen(), vec![Some("Bearer fresh".to_owned())]);
	assert_eq!(endpoint.calls(), 1);
}
