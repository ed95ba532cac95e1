use base64::prelude::*;
use hmac::Mac;

use crate::{Error, HmacSha256, Identity};

/// Purpose tag mixed into every token.
pub const ACTION: &str = "POST";

fn mac(secret: &str, identity: &Identity, action: &str) -> Result<HmacSha256, Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(format!("{identity}:{action}").as_bytes());

    Ok(mac)
}

/// Derives the token for `identity`. The same inputs always give the same token.
pub fn generate(secret: &str, identity: &Identity, action: &str) -> Result<String, Error> {
    let mac = mac(secret, identity, action)?;

    Ok(BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

/// Checks `candidate` against the token derived from the other arguments.
///
/// The comparison runs in constant time.
pub fn is_valid(candidate: &str, secret: &str, identity: &Identity, action: &str) -> bool {
    let Ok(received) = BASE64_URL_SAFE_NO_PAD.decode(candidate) else {
        return false;
    };

    match mac(secret, identity, action) {
        Ok(mac) => mac.verify_slice(&received).is_ok(),
        Err(err) => {
            tracing::error!(err = %err);
            false
        }
    }
}
