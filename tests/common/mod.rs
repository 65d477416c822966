#![allow(dead_code)]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use http::StatusCode;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Barrier, Notify};
// self
use bearer_session::{
	auth::{Credential, SignIn},
	coordinator::RenewalOutcome,
	error::TransportError,
	escalation::{AckFuture, SessionEndedNotice, SessionUi},
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	renewal::{RenewalEndpoint, RenewalFuture},
	session::Session,
	url::Url,
};

/// Builds a JWT-shaped token whose `exp` claim lies `ttl` from now.
pub fn token_expiring_in(ttl: Duration) -> String {
	token_expiring_at(OffsetDateTime::now_utc() + ttl)
}

pub fn token_expiring_at(instant: OffsetDateTime) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, instant.unix_timestamp()));

	format!("{header}.{payload}.signature")
}

pub fn items_request() -> HttpRequest {
	HttpRequest::get(
		Url::parse("https://app.example.com/api/items/").expect("Fixture URL should parse."),
	)
}

#[derive(Default)]
pub struct RecordingUi {
	pub notices: AtomicUsize,
	pub redirects: AtomicUsize,
	pub warnings_shown: AtomicUsize,
	pub warnings_hidden: AtomicUsize,
	pub last_notice: Mutex<Option<SessionEndedNotice>>,
}
impl RecordingUi {
	pub fn notices(&self) -> usize {
		self.notices.load(Ordering::SeqCst)
	}
}
impl SessionUi for RecordingUi {
	fn expiry_warning(&self, visible: bool) {
		if visible {
			self.warnings_shown.fetch_add(1, Ordering::SeqCst);
		} else {
			self.warnings_hidden.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn session_ended(&self, notice: SessionEndedNotice) -> AckFuture<'_> {
		self.notices.fetch_add(1, Ordering::SeqCst);
		*self.last_notice.lock() = Some(notice);

		Box::pin(async {})
	}

	fn redirect_to_sign_in(&self) {
		self.redirects.fetch_add(1, Ordering::SeqCst);
	}
}

/// Renewal endpoint that blocks every call until [`GatedEndpoint::release`] is called.
pub struct GatedEndpoint {
	pub calls: AtomicUsize,
	gate: Notify,
	outcome: Mutex<RenewalOutcome>,
}
impl GatedEndpoint {
	pub fn new(outcome: RenewalOutcome) -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			gate: Notify::new(),
			outcome: Mutex::new(outcome),
		})
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Lets the current (or next) renewal call resolve.
	pub fn release(&self) {
		self.gate.notify_one();
	}
}
impl RenewalEndpoint for GatedEndpoint {
	fn renew(&self) -> RenewalFuture<'_> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			self.gate.notified().await;

			self.outcome.lock().clone()
		})
	}
}

/// Resource server accepting exactly one bearer token.
///
/// Requests carrying a token containing `stale` are held until `rejected_batch` of them arrived,
/// then all of them are answered with 401 together. Every other token is rejected immediately.
pub struct TokenGate {
	accepted: Option<String>,
	rejections: Barrier,
	pub seen: Mutex<Vec<Option<String>>>,
}
impl TokenGate {
	pub fn new(accepted: Option<&str>, rejected_batch: usize) -> Arc<Self> {
		Arc::new(Self {
			accepted: accepted.map(|token| format!("Bearer {token}")),
			rejections: Barrier::new(rejected_batch),
			seen: Mutex::new(Vec::new()),
		})
	}

	pub fn seen(&self) -> Vec<Option<String>> {
		self.seen.lock().clone()
	}

	pub fn count(&self, authorization: &str) -> usize {
		self.seen.lock().iter().filter(|seen| seen.as_deref() == Some(authorization)).count()
	}
}
impl HttpTransport for TokenGate {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		let authorization = request.authorization().map(ToOwned::to_owned);
		let accepted = self.accepted.is_some() && self.accepted == authorization;

		self.seen.lock().push(authorization.clone());

		Box::pin(async move {
			if accepted {
				return Ok::<_, TransportError>(HttpResponse::new(StatusCode::OK));
			}
			if authorization.as_deref().is_some_and(|value| value.contains("stale")) {
				self.rejections.wait().await;
			}

			Ok(HttpResponse::new(StatusCode::UNAUTHORIZED))
		})
	}
}

pub async fn signed_in_session(
	endpoint: Arc<dyn RenewalEndpoint>,
	ui: Arc<RecordingUi>,
	token: &str,
) -> Session {
	let session =
		Session::builder(endpoint, ui).build().expect("Default session configuration is valid.");

	session
		.sign_in(SignIn::new(Credential::from_token(token), Some("reader@example.com".into())))
		.await
		.expect("In-memory sign-in should succeed.");

	session
}
