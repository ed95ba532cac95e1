use axum_core::body::Body;
use bytes::Bytes;
use futures_util::{
    future::{self, BoxFuture},
    stream,
};
use http::{header, HeaderMap, Request, Response, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::{
    any::type_name,
    convert::Infallible,
    marker::PhantomData,
    task::{Context, Poll},
};
use tower_layer::Layer;
use tower_service::Service;

use crate::{write_plain, Csrf, Error, Token};

/// Largest form body buffered while looking for the token field.
const FORM_LIMIT: usize = 2 * 1024 * 1024;

/// Rejects requests that don't carry a valid CSRF token.
///
/// Apply it to the routes that need protection. The token is read from the
/// header first, then from the form field of an urlencoded or multipart body,
/// or the query string. A missing token is answered with `400 Bad Request`,
/// an invalid one with the capability's [`Csrf::error`] response.
pub struct Guard<C = Token> {
    _csrf: PhantomData<fn() -> C>,
}

impl Guard {
    pub fn new() -> Self {
        Self::for_capability()
    }
}

impl<C> Guard<C> {
    /// A guard reading capability `C` from the request extensions instead of [`Token`].
    pub fn for_capability() -> Self {
        Self { _csrf: PhantomData }
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Clone for Guard<C> {
    fn clone(&self) -> Self {
        Self::for_capability()
    }
}

impl<S, C> Layer<S> for Guard<C> {
    type Service = GuardService<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            _csrf: PhantomData,
        }
    }
}

pub struct GuardService<S, C = Token> {
    inner: S,
    _csrf: PhantomData<fn() -> C>,
}

impl<S: Clone, C> Clone for GuardService<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _csrf: PhantomData,
        }
    }
}

enum Encoding {
    Urlencoded,
    Multipart(String),
}

fn encoding(headers: &HeaderMap) -> Option<Encoding> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())?;

    if content_type.starts_with("application/x-www-form-urlencoded") {
        Some(Encoding::Urlencoded)
    } else {
        multer::parse_boundary(content_type)
            .ok()
            .map(Encoding::Multipart)
    }
}

fn form_value(input: &[u8], name: &str) -> Option<String> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(input)
        .ok()?
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// First non-file part called `name`. Parts after it are never parsed.
async fn multipart_value(body: Bytes, boundary: String, name: &str) -> Option<String> {
    let stream = stream::once(future::ready(Ok::<_, Infallible>(body)));
    let mut multipart = multer::Multipart::new(stream, boundary);

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(name) && field.file_name().is_none() => {
                return field.text().await.ok().filter(|value| !value.is_empty());
            }
            Ok(Some(_)) => continue,
            Ok(None) => return None,
            Err(err) => {
                tracing::debug!(err = %err, "malformed multipart body");

                return None;
            }
        }
    }
}

fn unreadable_body(err: &(dyn std::error::Error + Send + Sync + 'static)) -> Response<Body> {
    tracing::debug!(err = %err, "couldn't read form body");

    let mut response = Response::default();
    if err.is::<LengthLimitError>() {
        write_plain(&mut response, StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large");
    } else {
        write_plain(&mut response, StatusCode::BAD_REQUEST, "Bad Request");
    }

    response
}

/// Looks `name` up in an urlencoded or multipart body, then in the query
/// string. The body is buffered and put back so the handler still sees it.
/// A body that can't be buffered is answered right away.
async fn read_form(
    request: Request<Body>,
    name: &str,
) -> Result<(Option<String>, Request<Body>), Response<Body>> {
    let query = request
        .uri()
        .query()
        .and_then(|q| form_value(q.as_bytes(), name));

    let Some(encoding) = encoding(request.headers()) else {
        return Ok((query, request));
    };

    let (parts, body) = request.into_parts();

    let bytes = match Limited::new(body, FORM_LIMIT).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => return Err(unreadable_body(err.as_ref())),
    };

    let value = match encoding {
        Encoding::Urlencoded => form_value(&bytes, name),
        Encoding::Multipart(boundary) => multipart_value(bytes.clone(), boundary, name).await,
    };

    Ok((
        value.or(query),
        Request::from_parts(parts, Body::from(bytes)),
    ))
}

impl<S, C> Service<Request<Body>> for GuardService<S, C>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    C: Csrf + Clone + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let csrf = match request
            .extensions()
            .get::<C>()
            .cloned()
            .ok_or(Error::ExtensionNotFound(type_name::<C>().into()))
        {
            Ok(csrf) => csrf,
            Err(err) => return Box::pin(async move { Error::make_layer_error(err) }),
        };

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let header_value = request
                .headers()
                .get(csrf.header_name())
                .filter(|h| !h.is_empty())
                .map(|h| String::from_utf8_lossy(h.as_bytes()).into_owned());

            let (candidate, request) = match header_value {
                Some(value) => (Some(value), request),
                None => match read_form(request, csrf.form_name()).await {
                    Ok(found) => found,
                    Err(response) => return Ok(response),
                },
            };

            match candidate {
                Some(candidate) if csrf.valid_token(&candidate) => inner.call(request).await,
                Some(_) => {
                    tracing::debug!("invalid csrf token");

                    let mut response = Response::default();
                    csrf.error(&mut response);

                    Ok(response)
                }
                None => Error::make_bad_request(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderValue, Method};
    use tower::{service_fn, ServiceExt};

    use super::*;

    #[derive(Clone)]
    struct Stub;

    impl Csrf for Stub {
        fn header_name(&self) -> &str {
            "x-csrftoken"
        }

        fn form_name(&self) -> &str {
            "_csrf"
        }

        fn cookie_name(&self) -> &str {
            "_csrf"
        }

        fn token(&self) -> Option<&str> {
            None
        }

        fn valid_token(&self, candidate: &str) -> bool {
            candidate == "good"
        }

        fn error(&self, response: &mut Response<Body>) {
            *response.status_mut() = StatusCode::UNPROCESSABLE_ENTITY;
            *response.body_mut() = Body::from("custom error\n");
        }
    }

    async fn echo_body(request: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(request.into_body()))
    }

    fn post() -> http::request::Builder {
        Request::builder().method(Method::POST).uri("/private")
    }

    fn form(body: &'static str) -> anyhow::Result<Request<Body>> {
        Ok(post()
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))?)
    }

    fn multipart(body: &'static str) -> anyhow::Result<Request<Body>> {
        Ok(post()
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XX")
            .body(Body::from(body))?)
    }

    async fn send(mut request: Request<Body>) -> anyhow::Result<(StatusCode, String)> {
        request.extensions_mut().insert(Stub);

        let response = Guard::<Stub>::for_capability()
            .layer(service_fn(echo_body))
            .oneshot(request)
            .await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

        Ok((status, String::from_utf8(bytes.to_vec())?))
    }

    #[tokio::test]
    async fn passes_valid_header() -> anyhow::Result<()> {
        let request = post().header("x-csrftoken", "good").body(Body::empty())?;

        assert_eq!(send(request).await?.0, StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn header_takes_precedence_over_form() -> anyhow::Result<()> {
        let mut request = form("_csrf=good")?;
        request
            .headers_mut()
            .insert("x-csrftoken", "bad".parse()?);
        assert_eq!(
            send(request).await?,
            (StatusCode::UNPROCESSABLE_ENTITY, "custom error\n".into())
        );

        let mut request = form("_csrf=bad")?;
        request
            .headers_mut()
            .insert("x-csrftoken", "good".parse()?);
        assert_eq!(send(request).await?.0, StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn passes_valid_form_and_keeps_body() -> anyhow::Result<()> {
        assert_eq!(
            send(form("name=ketchup&_csrf=good")?).await?,
            (StatusCode::OK, "name=ketchup&_csrf=good".into())
        );

        Ok(())
    }

    #[tokio::test]
    async fn rejects_invalid_form() -> anyhow::Result<()> {
        assert_eq!(
            send(form("_csrf=invalid")?).await?,
            (StatusCode::UNPROCESSABLE_ENTITY, "custom error\n".into())
        );

        Ok(())
    }

    #[tokio::test]
    async fn reads_query_string() -> anyhow::Result<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/private?_csrf=good")
            .body(Body::empty())?;

        assert_eq!(send(request).await?.0, StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn empty_header_falls_back_to_form() -> anyhow::Result<()> {
        let mut request = form("_csrf=good")?;
        request.headers_mut().insert("x-csrftoken", "".parse()?);

        assert_eq!(send(request).await?.0, StatusCode::OK);

        Ok(())
    }

    #[tokio::test]
    async fn missing_token_is_bad_request() -> anyhow::Result<()> {
        let expected = (StatusCode::BAD_REQUEST, "Bad Request".to_owned());

        assert_eq!(send(post().body(Body::empty())?).await?, expected);
        assert_eq!(send(form("_csrf=")?).await?, expected);
        assert_eq!(
            send(post().body(Body::from("_csrf=good"))?).await?,
            expected
        );

        Ok(())
    }

    #[tokio::test]
    async fn missing_capability_is_server_error() -> anyhow::Result<()> {
        let response = Guard::new()
            .layer(service_fn(echo_body))
            .oneshot(post().header("x-csrftoken", "good").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        Ok(())
    }

    #[tokio::test]
    async fn passes_valid_multipart_and_keeps_body() -> anyhow::Result<()> {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\r\n\
            ketchup\r\n\
            --XX\r\n\
            Content-Disposition: form-data; name=\"_csrf\"\r\n\r\n\
            good\r\n\
            --XX--\r\n";

        assert_eq!(send(multipart(body)?).await?, (StatusCode::OK, body.into()));

        Ok(())
    }

    #[tokio::test]
    async fn rejects_invalid_multipart() -> anyhow::Result<()> {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"_csrf\"\r\n\r\n\
            invalid\r\n\
            --XX--\r\n";

        assert_eq!(
            send(multipart(body)?).await?,
            (StatusCode::UNPROCESSABLE_ENTITY, "custom error\n".into())
        );

        Ok(())
    }

    #[tokio::test]
    async fn multipart_file_part_is_not_a_token() -> anyhow::Result<()> {
        let body = "--XX\r\n\
            Content-Disposition: form-data; name=\"_csrf\"; filename=\"token.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            good\r\n\
            --XX--\r\n";

        assert_eq!(
            send(multipart(body)?).await?,
            (StatusCode::BAD_REQUEST, "Bad Request".into())
        );

        Ok(())
    }

    #[tokio::test]
    async fn oversized_body_is_not_forwarded() -> anyhow::Result<()> {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/private?_csrf=good")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("a".repeat(3 * 1024 * 1024)))?;

        assert_eq!(
            send(request).await?,
            (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large".into())
        );

        Ok(())
    }

    #[tokio::test]
    async fn non_ascii_header_is_invalid_not_missing() -> anyhow::Result<()> {
        let mut request = form("_csrf=good")?;
        request
            .headers_mut()
            .insert("x-csrftoken", HeaderValue::from_bytes(b"\xe9bad")?);

        assert_eq!(
            send(request).await?,
            (StatusCode::UNPROCESSABLE_ENTITY, "custom error\n".into())
        );

        Ok(())
    }
}
