//! ## Overview
//!
//! This crate mitigates CSRF with tokens bound to the user's session, using the
//! [Synchronizer Token Pattern][owasp-synchronizer] without storing tokens on
//! the server.
//!
//! ### How it works
//!
//! - **Secret key**: You provide a **secret key** used to sign CSRF tokens (See: [OWASP's Cryptographic Storage Cheat Sheet][owasp-cryptographic-storage]).
//! - **Identity**: The [`SeeSurf`] layer reads the user's **identity** (a string or an integer) from the
//!   [`tower-sessions`][crate-tower-sessions] session under a configurable key. Without one, nothing happens.
//! - **Token creation**:
//!   - On a `GET` request without an `Origin` header, the token is the HMAC-SHA256 of the **identity**
//!     and a fixed purpose tag, keyed by the **secret key**.
//!   - If the request already carries the token cookie, its value is reused.
//! - **Token transport**:
//!   - Handlers get it from the [`Token`] extractor, typically to fill a hidden form field.
//!   - Optionally as a cookie (`_csrf`) and/or a response header (`X-CSRFToken`).
//! - **Token validation**:
//!   - The [`Guard`] layer is added to the routes you want protected.
//!   - It reads the token from the header, or else from the form field.
//!   - The token is recomputed from the **identity** and compared in constant time.
//!   - A missing token gets `400 Bad Request`; an invalid one gets the configurable error response.
//!
//! ### Cookies
//!
//! The cookie isn't `HttpOnly`, page scripts need to read it to send the header.
//! It lives for one day and is only `Secure` if you ask for it.
//!
//! ## Usage
//!
//! ### With [`axum`][crate-axum]
//!
//! ```rust, no_run
//! use std::net::SocketAddr;
//!
//! use axum::{
//!     routing::{get, post},
//!     Router,
//! };
//! use http::StatusCode;
//! use tower_seesurf::{Csrf, Guard, SeeSurf, Token};
//! use tower_sessions::{MemoryStore, Session, SessionManagerLayer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .route("/login", get(login))
//!         .route("/form", get(form))
//!         .route("/submit", post(submit).layer(Guard::new()))
//!         .layer(SeeSurf::new("secret-key").set_cookie(true))
//!         .layer(SessionManagerLayer::new(MemoryStore::default()));
//!
//!     let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
//!     let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
//!
//!     axum::serve(listener, app.into_make_service())
//!         .await
//!         .unwrap();
//! }
//!
//! async fn login(session: Session) -> Result<StatusCode, StatusCode> {
//!     session
//!         .insert("uid", "unique-user-id")
//!         .await
//!         .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
//!
//!     Ok(StatusCode::OK)
//! }
//!
//! async fn form(token: Token) -> String {
//!     format!(
//!         r#"<form method="post" action="/submit"><input type="hidden" name="{}" value="{}"></form>"#,
//!         token.form_name(),
//!         token.token().unwrap_or_default(),
//!     )
//! }
//!
//! async fn submit() -> StatusCode {
//!     StatusCode::OK
//! }
//! ```
//!
//! [crate-axum]: https://github.com/tokio-rs/axum
//! [crate-tower-sessions]: https://github.com/maxcountryman/tower-sessions
//! [owasp-cryptographic-storage]: https://cheatsheetseries.owasp.org/cheatsheets/Cryptographic_Storage_Cheat_Sheet.html
//! [owasp-synchronizer]: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html#synchronizer-token-pattern

use hmac::Hmac;
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

pub use domain::cookie_domain;
pub use error::{default_error_handler, write_plain, Error};
pub use guard::{Guard, GuardService};
pub use identity::{Identity, IdentityLookup};
pub use surf::{SeeSurf, SeeSurfService};
pub use token::{Csrf, Token};

pub mod codec;

mod domain;
mod error;
mod guard;
mod identity;
mod surf;
mod token;

#[cfg(feature = "axum")]
mod extract;
