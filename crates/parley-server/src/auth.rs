//! Caller identity.
//!
//! Authentication itself happens in front of this server. The proxy sets
//! `x-parley-user` and `x-parley-user-type`; the [`Authenticator`] trait is
//! the seam for swapping in a real session store.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use parley_core::{UserId, UserType};

use crate::state::AppState;

pub const USER_HEADER: &str = "x-parley-user";
pub const USER_TYPE_HEADER: &str = "x-parley-user-type";

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub user_type: UserType,
}

impl Session {
    pub fn guest() -> Self {
        Self {
            user_id: UserId::generate(),
            user_type: UserType::Guest,
        }
    }
}

/// Resolves the session of an incoming request.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Session>;
}

/// Trusts identity headers set by the fronting proxy.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderAuthenticator;

#[async_trait]
impl Authenticator for HeaderAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> Option<Session> {
        let raw = headers.get(USER_HEADER)?.to_str().ok()?;
        let user_id = match raw.parse::<UserId>() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed {} header", USER_HEADER);
                return None;
            }
        };

        let user_type = match headers.get(USER_TYPE_HEADER).and_then(|v| v.to_str().ok()) {
            None => UserType::Regular,
            Some(raw) => match raw.parse::<UserType>() {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed {} header", USER_TYPE_HEADER);
                    return None;
                }
            },
        };

        Some(Session { user_id, user_type })
    }
}

/// Extractor for the (possibly anonymous) caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Option<Session>);

impl Caller {
    pub fn session(&self) -> Option<&Session> {
        self.0.as_ref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.0.as_ref().map(|s| &s.user_id)
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Caller(state.authenticator.authenticate(&parts.headers).await))
    }
}
