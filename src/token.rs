use std::sync::Arc;

use axum_core::body::Body;
use http::Response;

use crate::{codec, surf::Config, Identity};

/// What a handler or [`Guard`](crate::Guard) needs to know about CSRF for the
/// current request.
pub trait Csrf {
    /// HTTP header searched for a submitted token.
    fn header_name(&self) -> &str;
    /// Form field searched for a submitted token.
    fn form_name(&self) -> &str;
    /// Cookie carrying the token to the client.
    fn cookie_name(&self) -> &str;
    /// The token issued for this request, usually embedded in a hidden form
    /// field. `None` unless this was a top-level `GET` from a known identity.
    fn token(&self) -> Option<&str>;
    /// Checks a submitted token against the current identity.
    fn valid_token(&self, candidate: &str) -> bool;
    /// Writes the failure response for a token that didn't validate.
    fn error(&self, response: &mut Response<Body>);
}

/// The per-request [`Csrf`] capability published by [`SeeSurf`](crate::SeeSurf).
#[derive(Clone)]
pub struct Token {
    pub(crate) config: Arc<Config>,
    pub(crate) identity: Option<Identity>,
    pub(crate) value: Option<String>,
}

impl Token {
    pub(crate) fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            identity: None,
            value: None,
        }
    }

    /// The identity the token is bound to, if the session had one.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

impl Csrf for Token {
    fn header_name(&self) -> &str {
        self.config.header_name.as_str()
    }

    fn form_name(&self) -> &str {
        &self.config.form_name
    }

    fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    fn token(&self) -> Option<&str> {
        self.value.as_deref()
    }

    fn valid_token(&self, candidate: &str) -> bool {
        match &self.identity {
            Some(identity) => {
                codec::is_valid(candidate, &self.config.secret, identity, codec::ACTION)
            }
            None => false,
        }
    }

    fn error(&self, response: &mut Response<Body>) {
        (self.config.error_handler)(response);
    }
}
