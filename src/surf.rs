use axum_core::body::Body;
use futures_util::future::BoxFuture;
use http::{header, HeaderName, HeaderValue, Method, Request, Response};
use std::{
    sync::Arc,
    task::{Context, Poll},
};
use tower_cookies::{
    cookie::{
        time::{Duration, OffsetDateTime},
        SameSite,
    },
    Cookie, CookieManager, Cookies,
};
use tower_layer::Layer;
use tower_service::Service;
use tower_sessions::Session;

use crate::{
    codec, domain::cookie_domain, error::default_error_handler, Error, IdentityLookup, Token,
};

pub(crate) type ErrorHandler = Arc<dyn Fn(&mut Response<Body>) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct Config {
    pub(crate) secret: String,
    pub(crate) header_name: HeaderName,
    pub(crate) form_name: String,
    pub(crate) cookie_name: String,
    pub(crate) session_key: String,
    pub(crate) set_header: bool,
    pub(crate) set_cookie: bool,
    pub(crate) secure: bool,
    pub(crate) same_site: Option<SameSite>,
    pub(crate) error_handler: ErrorHandler,
}

impl Config {
    fn cookie(&self, token: String, host: Option<&str>) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .expires(OffsetDateTime::now_utc() + Duration::days(1))
            .http_only(false)
            .secure(self.secure);

        if let Some(same_site) = self.same_site {
            cookie = cookie.same_site(same_site);
        }

        if let Some(domain) = host.and_then(cookie_domain) {
            cookie = cookie.domain(domain.to_owned());
        }

        cookie.build()
    }
}

/// Issues CSRF tokens bound to the identity stored in the session.
///
/// Needs a `tower_sessions::SessionManagerLayer` further out in the stack.
#[derive(Clone)]
pub struct SeeSurf {
    pub(crate) config: Config,
}

impl SeeSurf {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            config: Config {
                secret: secret.into(),
                header_name: HeaderName::from_static("x-csrftoken"),
                form_name: "_csrf".into(),
                cookie_name: "_csrf".into(),
                session_key: "uid".into(),
                set_header: false,
                set_cookie: false,
                secure: false,
                same_site: None,
                error_handler: Arc::new(default_error_handler),
            },
        }
    }

    pub fn header_name(mut self, header_name: HeaderName) -> Self {
        self.config.header_name = header_name;

        self
    }

    pub fn form_name(mut self, form_name: impl Into<String>) -> Self {
        self.config.form_name = form_name.into();

        self
    }

    pub fn cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.config.cookie_name = cookie_name.into();

        self
    }

    /// Session key holding the user's identity, a string or an integer.
    pub fn session_key(mut self, session_key: impl Into<String>) -> Self {
        self.config.session_key = session_key.into();

        self
    }

    /// Append the token to the response under the header name.
    pub fn set_header(mut self, set_header: bool) -> Self {
        self.config.set_header = set_header;

        self
    }

    /// Send freshly derived tokens in a cookie.
    pub fn set_cookie(mut self, set_cookie: bool) -> Self {
        self.config.set_cookie = set_cookie;

        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;

        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.config.same_site = Some(same_site);

        self
    }

    /// Replaces the response written when a submitted token is invalid.
    ///
    /// Requests without any token always get a plain `400 Bad Request`.
    pub fn error_handler<F>(mut self, error_handler: F) -> Self
    where
        F: Fn(&mut Response<Body>) + Send + Sync + 'static,
    {
        self.config.error_handler = Arc::new(error_handler);

        self
    }
}

impl<S> Layer<S> for SeeSurf {
    type Service = CookieManager<SeeSurfService<S>>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieManager::new(SeeSurfService {
            config: Arc::new(self.config.clone()),
            inner,
        })
    }
}

#[derive(Clone)]
pub struct SeeSurfService<S> {
    config: Arc<Config>,
    inner: S,
}

fn issues_token<Q>(request: &Request<Q>) -> bool {
    request.method() == Method::GET
        && !request
            .headers()
            .get(header::ORIGIN)
            .is_some_and(|origin| !origin.is_empty())
}

fn request_host<Q>(request: &Request<Q>) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| request.uri().host())
        .map(ToOwned::to_owned)
}

impl<S, Q, R> Service<Request<Q>> for SeeSurfService<S>
where
    S: Service<Request<Q>, Response = Response<R>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    Q: Send + 'static,
    R: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Q>) -> Self::Future {
        let cookies = match request
            .extensions()
            .get::<Cookies>()
            .cloned()
            .ok_or(Error::ExtensionNotFound("Cookies".into()))
        {
            Ok(cookies) => cookies,
            Err(err) => return Box::pin(async move { Error::make_layer_error(err) }),
        };

        let session = match request
            .extensions()
            .get::<Session>()
            .cloned()
            .ok_or(Error::ExtensionNotFound("Session".into()))
        {
            Ok(session) => session,
            Err(err) => return Box::pin(async move { Error::make_layer_error(err) }),
        };

        let config = self.config.clone();
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut token = Token::new(config.clone());

            match IdentityLookup::lookup(&session, &config.session_key).await {
                Ok(IdentityLookup::Found(identity)) => token.identity = Some(identity),
                Ok(IdentityLookup::Absent) => {
                    tracing::debug!(key = %config.session_key, "no identity in session");
                }
                Ok(IdentityLookup::Unsupported) => {
                    tracing::debug!(key = %config.session_key, "unsupported identity type");
                }
                Err(err) => return Error::make_layer_error(err),
            }

            if let (Some(identity), true) = (&token.identity, issues_token(&request)) {
                let existing = cookies
                    .get(&config.cookie_name)
                    .map(|c| c.value().to_owned())
                    .filter(|v| !v.is_empty());

                let value = match existing {
                    Some(value) => value,
                    None => {
                        let value = match codec::generate(&config.secret, identity, codec::ACTION)
                        {
                            Ok(value) => value,
                            Err(err) => return Error::make_layer_error(err),
                        };

                        if config.set_cookie {
                            let host = request_host(&request);
                            cookies.add(config.cookie(value.clone(), host.as_deref()));
                        }

                        value
                    }
                };

                token.value = Some(value);
            }

            let issued = token.value.clone();
            request.extensions_mut().insert(token);

            let mut response = inner.call(request).await?;

            if config.set_header {
                if let Some(value) = issued.and_then(|v| HeaderValue::from_str(&v).ok()) {
                    response
                        .headers_mut()
                        .append(config.header_name.clone(), value);
                }
            }

            Ok(response)
        })
    }
}
