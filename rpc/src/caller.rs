//! Caller identity.
//!
//! The identity collaborator in front of this service authenticates the
//! user and forwards the result in request headers. Handlers turn those
//! headers into an explicit [`UserContext`]; nothing else in the request
//! path knows who is calling.

use axum::http::HeaderMap;

use dareduel_types::{UserContext, UserId};

use crate::RpcError;

pub const USER_HEADER: &str = "x-user-id";
pub const NAME_HEADER: &str = "x-display-name";

pub fn caller(headers: &HeaderMap) -> Result<UserContext, RpcError> {
    let raw = headers
        .get(USER_HEADER)
        .ok_or_else(|| RpcError::Unauthenticated(format!("{USER_HEADER} header missing")))?
        .to_str()
        .map_err(|_| RpcError::Unauthenticated(format!("{USER_HEADER} is not text")))?;
    let user_id = UserId::parse(raw).map_err(|e| RpcError::Unauthenticated(e.to_string()))?;
    let name = headers
        .get(NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    Ok(UserContext::new(user_id, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn identity_comes_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller(&headers).unwrap_err().code(), "unauthenticated");

        headers.insert(USER_HEADER, HeaderValue::from_static("ann"));
        let ctx = caller(&headers).unwrap();
        assert_eq!(ctx.user_id.as_str(), "ann");
        assert_eq!(ctx.display_name, "ann");

        headers.insert(NAME_HEADER, HeaderValue::from_static("Ann"));
        assert_eq!(caller(&headers).unwrap().display_name, "Ann");
    }
}
