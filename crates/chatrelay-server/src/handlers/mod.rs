pub mod admin;
pub mod chat;
pub mod feed;
pub mod health;
pub mod hub;
pub mod sessions;
pub mod socket;

use actix_web::HttpRequest;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-Id";
const USER_ID_QUERY_PARAM: &str = "userId";

/// Resolve the caller's user id from the `X-User-Id` header or `userId` query parameter.
///
/// Socket clients that cannot set headers use the query parameter.
pub fn user_id(req: &HttpRequest) -> Result<String, AppError> {
    let from_header = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    from_header
        .or_else(|| query_param(req.query_string(), USER_ID_QUERY_PARAM))
        .ok_or_else(|| AppError::validation("missing user identity"))
}

fn query_param(query: &str, name: &str) -> Option<String> {
    actix_web::web::Query::<std::collections::HashMap<String, String>>::from_query(query)
        .ok()
        .and_then(|params| params.get(name).cloned())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
