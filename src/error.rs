use axum_core::body::Body;
use http::{header, HeaderValue, StatusCode};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Maps the [`hmac::digest::InvalidLength`] error.
    #[error(transparent)]
    InvalidLength(#[from] hmac::digest::InvalidLength),
    /// An expected extension was missing.
    #[error("couldn't extract `{0}`. is `SeeSurf` enabled?")]
    ExtensionNotFound(String),
    /// The session store failed while looking up the identity.
    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),
}

impl Error {
    pub(crate) fn make_layer_error<T: Default, E>(
        err: impl std::error::Error,
    ) -> Result<http::Response<T>, E> {
        tracing::error!(err = %err);

        let mut response = http::Response::default();
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

        Ok(response)
    }

    pub(crate) fn make_bad_request<E>() -> Result<http::Response<Body>, E> {
        let mut response = http::Response::default();
        write_plain(&mut response, StatusCode::BAD_REQUEST, "Bad Request");

        Ok(response)
    }
}

/// Fills `response` with a plain-text error.
pub fn write_plain(response: &mut http::Response<Body>, status: StatusCode, message: &'static str) {
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    *response.body_mut() = Body::from(message);
}

/// The error callback used unless [`SeeSurf::error_handler`](crate::SeeSurf::error_handler)
/// replaces it: `400 Invalid csrf token.`
pub fn default_error_handler(response: &mut http::Response<Body>) {
    write_plain(response, StatusCode::BAD_REQUEST, "Invalid csrf token.");
}
