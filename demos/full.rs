use std::net::SocketAddr;

use axum::{
    response::{Html, Redirect},
    routing::{get, post},
    Router,
};
use http::StatusCode;
use tower_seesurf::{Csrf, Guard, SeeSurf, Token};
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};

#[tokio::main]
async fn main() {
    let app = Router::new()
        .route("/", get(root))
        .route("/submit", post(submit).layer(Guard::new()))
        .route("/login", get(login))
        .route("/logout", get(logout))
        .layer(
            SeeSurf::new("secret-key")
                .set_cookie(true)
                .set_header(true),
        )
        .layer(SessionManagerLayer::new(MemoryStore::default()).with_secure(false));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    axum::serve(listener, app.into_make_service())
        .await
        .unwrap();
}

async fn root(token: Token) -> Html<String> {
    let Some(value) = token.token() else {
        return Html(r#"<p><a href="/login">Login</a> to get a token.</p>"#.into());
    };

    Html(format!(
        r#"<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/@picocss/pico@2/css/pico.min.css">
<main class="container">
    <nav><ul><li><a href="/logout">Logout</a></li></ul></nav>
    <p><mark>Open the Network tab in your dev console.</mark></p>
    <p><small><kbd>{value}</kbd></small></p>
    <div class="grid">
        <form method="post" action="/submit">
            <input type="hidden" name="{form}" value="{value}">
            <button type="submit">Submit with token</button>
        </form>
        <form method="post" action="/submit">
            <input type="hidden" name="{form}" value="forged">
            <button type="submit">Submit with a forged token</button>
        </form>
        <form method="post" action="/submit">
            <button type="submit">Submit without token</button>
        </form>
    </div>
</main>"#,
        form = token.form_name(),
    ))
}

async fn submit() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Success!")
}

async fn login(session: Session) -> Result<Redirect, (StatusCode, String)> {
    session
        .insert("uid", "secret-session-identifier")
        .await
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Redirect::to("/"))
}

async fn logout(session: Session) -> Result<Redirect, (StatusCode, String)> {
    session
        .flush()
        .await
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Redirect::to("/"))
}
