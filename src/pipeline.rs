//! Authorized request pipeline.
//!
//! [`AuthorizedClient::send`] attaches the current credential, and when the remote system answers
//! `401 Unauthorized` it renews through the session's [`RefreshCoordinator`] and replays the
//! request once with the renewed credential. Concurrent rejected requests all join the same
//! renewal and each replay exactly once. When renewal is impossible the session escalates and the
//! original rejection is handed back to the caller.
//!
//! [`RefreshCoordinator`]: crate::coordinator::RefreshCoordinator

// self
use crate::{
	_prelude::*,
	auth::{BearerSecret, Credential},
	coordinator::RenewalTrigger,
	http::{HttpRequest, HttpResponse, HttpTransport},
	obs::{FlowKind, FlowOutcome, FlowSpan},
	session::Session,
};

/// HTTP client that authorizes every request with the session credential.
pub struct AuthorizedClient<T>
where
	T: ?Sized + HttpTransport,
{
	session: Session,
	transport: Arc<T>,
}
impl<T> AuthorizedClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Binds `transport` to `session`.
	pub fn new(session: Session, transport: impl Into<Arc<T>>) -> Self {
		Self { session, transport: transport.into() }
	}

	/// Returns the session this client authorizes with.
	pub fn session(&self) -> &Session {
		&self.session
	}

	/// Sends `request`, replaying it at most once after a successful renewal.
	///
	/// Requests without a credential go out unauthenticated; their 401 is returned unchanged
	/// unless a failed renewal left the session awaiting escalation. Any non-401 response is
	/// returned unchanged, and so is the response of the replay, even when it is another 401. If
	/// renewal fails the session escalates and the original 401 response is returned.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::start(KIND, "send", self.session.store().epoch());
		let outcome = span.instrument(self.send_with_replay(request)).await;

		span.finish(if outcome.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure });

		outcome
	}

	async fn send_with_replay(&self, mut request: HttpRequest) -> Result<HttpResponse> {
		let coordinator = self.session.coordinator();

		// Never attach a credential that an in-flight renewal is about to replace.
		let _ = coordinator.wait_in_flight().await;

		let sent_with = authorize(&mut request, self.session.credential().as_ref());
		let response = self.transport.execute(request.clone()).await?;

		if !response.is_unauthorized() {
			return Ok(response);
		}

		let renewed = match self.changed_since(sent_with.as_ref()) {
			SinceSent::NeedsRenewal => match coordinator.renew(RenewalTrigger::Reactive).await {
				Ok(credential) => credential,
				Err(e) => {
					tracing::warn!(error = %e, "renewal after rejection failed");
					self.session.escalation().escalate(e).await;

					return Ok(response);
				},
			},
			SinceSent::Replaced(credential) => {
				tracing::debug!("credential replaced while the request was in flight");

				credential
			},
			SinceSent::Ended => {
				tracing::debug!("session ended while the request was in flight");

				return Ok(response);
			},
		};

		authorize(&mut request, Some(&renewed));
		tracing::debug!(method = %request.method, "replaying rejected request");

		Ok(self.transport.execute(request).await?)
	}

	fn changed_since(&self, sent_with: Option<&BearerSecret>) -> SinceSent {
		let snapshot = self.session.store().snapshot();

		match (snapshot.credential, sent_with) {
			(Some(current), Some(sent_with)) if current.secret() == sent_with =>
				SinceSent::NeedsRenewal,
			(Some(current), _) => SinceSent::Replaced(current),
			(None, _)
				if snapshot.invalidated
					&& !self.session.escalation().has_ended(snapshot.epoch) =>
				SinceSent::NeedsRenewal,
			(None, _) => SinceSent::Ended,
		}
	}
}
impl<T> Clone for AuthorizedClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { session: self.session.clone(), transport: self.transport.clone() }
	}
}
impl<T> Debug for AuthorizedClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizedClient").field("session", &self.session).finish()
	}
}

// How the store moved between sending a request and reading its 401.
enum SinceSent {
	NeedsRenewal,
	Replaced(Credential),
	// No live session: never signed in, signed out, or already escalated.
	Ended,
}

fn authorize(request: &mut HttpRequest, credential: Option<&Credential>) -> Option<BearerSecret> {
	let Some(credential) = credential else {
		request.clear_authorization();

		return None;
	};

	match request.set_bearer(credential.secret()) {
		Ok(()) => Some(credential.secret().clone()),
		Err(e) => {
			tracing::warn!(error = %e, "credential is not a valid header value");
			request.clear_authorization();

			None
		},
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use ::http::StatusCode;
	// self
	use super::*;
	use crate::{
		auth::SignIn,
		error::{RenewalError, TransportError},
		escalation::TracingUi,
		http::TransportFuture,
		renewal::{RenewalEndpoint, RenewalFuture},
		session::SessionState,
	};

	struct CountingEndpoint {
		calls: AtomicUsize,
		next: &'static str,
	}
	impl RenewalEndpoint for CountingEndpoint {
		fn renew(&self) -> RenewalFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let next = self.next;

			Box::pin(async move {
				if next.is_empty() {
					Err(RenewalError::Rejected { status: 401 })
				} else {
					Ok(Credential::from_token(next))
				}
			})
		}
	}

	// Accepts only `Bearer fresh`, or everything when `open` is set.
	#[derive(Default)]
	struct Gatekeeper {
		open: bool,
		seen: Mutex<Vec<Option<String>>>,
	}
	impl HttpTransport for Gatekeeper {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			let authorization = request.authorization().map(ToOwned::to_owned);
			let status = if self.open || authorization.as_deref() == Some("Bearer fresh") {
				StatusCode::OK
			} else {
				StatusCode::UNAUTHORIZED
			};

			self.seen.lock().push(authorization);

			Box::pin(async move { Ok::<_, TransportError>(HttpResponse::new(status)) })
		}
	}

	async fn signed_in(next: &'static str) -> (Session, Arc<CountingEndpoint>) {
		let endpoint = Arc::new(CountingEndpoint { calls: AtomicUsize::new(0), next });
		let session = Session::builder(endpoint.clone(), Arc::new(TracingUi))
			.build()
			.expect("Default configuration should be valid.");

		session
			.sign_in(SignIn::new(Credential::from_token("stale"), None))
			.await
			.expect("Sign-in should succeed.");

		(session, endpoint)
	}

	fn request() -> HttpRequest {
		let url = Url::parse("https://app.example.com/api/items").expect("URL should parse.");

		HttpRequest::get(url)
	}

	#[tokio::test]
	async fn rejected_request_is_replayed_with_renewed_credential() {
		let (session, endpoint) = signed_in("fresh").await;
		let transport = Arc::new(Gatekeeper::default());
		let client = session.client(transport.clone());
		let response = client.send(request()).await.expect("Request should succeed.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
		assert_eq!(
			*transport.seen.lock(),
			vec![Some("Bearer stale".into()), Some("Bearer fresh".into())]
		);
	}

	#[tokio::test]
	async fn replay_is_not_retried_again() {
		let (session, endpoint) = signed_in("still-wrong").await;
		let transport = Arc::new(Gatekeeper::default());
		let client = session.client(transport.clone());
		let response = client.send(request()).await.expect("Request should complete.");

		assert_eq!(response.status, StatusCode::UNAUTHORIZED);
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
		assert_eq!(transport.seen.lock().len(), 2);
	}

	#[tokio::test]
	async fn failed_renewal_escalates_and_returns_rejection() {
		let (session, endpoint) = signed_in("").await;
		let transport = Arc::new(Gatekeeper::default());
		let client = session.client(transport.clone());
		let response = client.send(request()).await.expect("Request should complete.");

		assert_eq!(response.status, StatusCode::UNAUTHORIZED);
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
		assert_eq!(transport.seen.lock().len(), 1);
		assert_eq!(session.escalation().notices_shown(), 1);
		assert!(session.credential().is_none());
		assert!(!session.monitor().is_running());
	}

	#[tokio::test]
	async fn anonymous_requests_pass_through() {
		let (session, endpoint) = signed_in("fresh").await;

		session.sign_out().await.expect("Sign-out should succeed.");

		let transport = Arc::new(Gatekeeper { open: true, ..Default::default() });
		let client = session.client(transport.clone());
		let response = client.send(request()).await.expect("Request should succeed.");

		assert_eq!(response.status, StatusCode::OK);
		assert_eq!(*transport.seen.lock(), vec![None]);
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn rejection_without_a_session_does_not_renew() {
		let endpoint = Arc::new(CountingEndpoint { calls: AtomicUsize::new(0), next: "" });
		let session = Session::builder(endpoint.clone(), Arc::new(TracingUi))
			.build()
			.expect("Default configuration should be valid.");
		let transport = Arc::new(Gatekeeper::default());
		let client = session.client(transport.clone());

		for _ in 0..3 {
			let response = client.send(request()).await.expect("Request should complete.");

			assert_eq!(response.status, StatusCode::UNAUTHORIZED);
		}

		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
		assert_eq!(session.state(), SessionState::Anonymous);
		assert_eq!(session.escalation().notices_shown(), 0);
		assert_eq!(transport.seen.lock().len(), 3);
	}

	#[tokio::test]
	async fn rejection_after_sign_out_does_not_reinstall_a_credential() {
		let (session, endpoint) = signed_in("fresh").await;

		session.sign_out().await.expect("Sign-out should succeed.");

		let transport = Arc::new(Gatekeeper::default());
		let client = session.client(transport.clone());
		let response = client.send(request()).await.expect("Request should complete.");

		assert_eq!(response.status, StatusCode::UNAUTHORIZED);
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
		assert!(session.credential().is_none());
		assert_eq!(session.state(), SessionState::Anonymous);
		assert_eq!(*transport.seen.lock(), vec![None]);
	}

	#[tokio::test]
	async fn rejection_while_invalidated_renews_then_escalates() {
		let (session, endpoint) = signed_in("").await;

		assert!(session.renew().await.is_err());
		assert_eq!(session.state(), SessionState::Invalid);

		let transport = Arc::new(Gatekeeper::default());
		let client = session.client(transport.clone());
		let response = client.send(request()).await.expect("Request should complete.");

		assert_eq!(response.status, StatusCode::UNAUTHORIZED);
		assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
		assert_eq!(session.escalation().notices_shown(), 1);
		assert_eq!(session.state(), SessionState::Anonymous);
	}
}
