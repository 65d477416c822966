//! Client-side bearer session keeper: proactive expiry monitoring, single-flight renewal, one-shot
//! replay of rejected requests, and idempotent escalation when the session cannot be renewed.
//!
//! The entry point is [`session::Session`], an explicitly owned object that ties together the
//! [`store::CredentialStore`], the [`coordinator::RefreshCoordinator`], the
//! [`monitor::ExpirationMonitor`], and the [`escalation::EscalationHandler`]. Outbound traffic goes
//! through [`pipeline::AuthorizedClient`], which attaches the bearer credential and replays a
//! rejected request exactly once after a renewal.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod escalation;
pub mod http;
pub mod monitor;
pub mod obs;
pub mod pipeline;
pub mod renewal;
pub mod session;
pub mod store;

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
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
#[cfg(test)] use {color_eyre as _, httpmock as _};
