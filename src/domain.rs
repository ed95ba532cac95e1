use once_cell::sync::Lazy;
use regex::Regex;

static DOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\.?[a-z\d]+(?:(?:[a-z\d]*)|(?:[a-z\d\-]*[a-z\d]))(?:\.[a-z\d]+(?:(?:[a-z\d]*)|(?:[a-z\d\-]*[a-z\d])))*$",
    )
    .expect("domain pattern is valid")
});

/// Returns the cookie `Domain` for a request host, or `None` when the host
/// (port stripped) isn't a plain lower-case domain name.
pub fn cookie_domain(host: &str) -> Option<&str> {
    let hostname = host.split(':').next().unwrap_or_default();

    DOMAIN.is_match(hostname).then_some(hostname)
}
