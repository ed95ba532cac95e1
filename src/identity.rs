use std::fmt;

use serde_json::Value;
use tower_sessions::Session;

use crate::Error;

/// The session value a token is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identity {
    Text(String),
    Integer(i64),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Text(text) => f.write_str(text),
            Identity::Integer(integer) => write!(f, "{integer}"),
        }
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity::Text(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::Text(value.to_owned())
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Identity::Integer(value)
    }
}

/// Outcome of reading the identity out of the session.
///
/// Both [`IdentityLookup::Absent`] and [`IdentityLookup::Unsupported`] mean
/// no token is issued for the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityLookup {
    Found(Identity),
    Absent,
    Unsupported,
}

impl IdentityLookup {
    pub(crate) fn from_value(value: Option<Value>) -> Self {
        match value {
            None | Some(Value::Null) => IdentityLookup::Absent,
            Some(Value::String(text)) => IdentityLookup::Found(Identity::Text(text)),
            Some(Value::Number(number)) => number
                .as_i64()
                .map(|integer| IdentityLookup::Found(Identity::Integer(integer)))
                .unwrap_or(IdentityLookup::Unsupported),
            Some(_) => IdentityLookup::Unsupported,
        }
    }

    pub(crate) async fn lookup(session: &Session, key: &str) -> Result<Self, Error> {
        let value = session.get_value(key).await?;

        Ok(Self::from_value(value))
    }
}
