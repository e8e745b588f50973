use warp::{reject::Rejection, Filter};

use crate::error::ApiError;

use super::jwt::{verify_jwt_session, Principal, SessionData, SessionKey};

/// Token from an `Authorization: Token <jwt>` or `Bearer <jwt>` header.
fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;

    match scheme {
        "Token" | "Bearer" if !token.trim().is_empty() => Some(token.trim()),
        _ => None,
    }
}

fn resolve_principal(
    header: Option<String>,
    cookie: Option<String>,
    key: &SessionKey,
) -> Result<Principal, ApiError> {
    let token = match header {
        Some(header) => Some(
            parse_authorization(&header)
                .map(str::to_owned)
                .ok_or_else(|| ApiError::InvalidSession(String::from("Malformed header")))?,
        ),
        None => cookie,
    };

    match token {
        None => Ok(Principal::Anonymous),
        Some(token) => {
            verify_jwt_session(&token, key).map(|data| Principal::Authenticated(data.into()))
        }
    }
}

/// Anonymous when no credentials are sent; rejects invalid ones.
pub fn with_principal(
    key: SessionKey,
) -> impl Filter<Extract = (Principal,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional::<String>("session"))
        .and_then(move |header: Option<String>, cookie: Option<String>| {
            let key = key.clone();
            async move { resolve_principal(header, cookie, &key).map_err(warp::reject::custom) }
        })
}

pub fn with_session(
    key: SessionKey,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    with_principal(key).and_then(|principal: Principal| async move {
        match principal {
            Principal::Authenticated(session) => Ok(session),
            Principal::Anonymous => Err(warp::reject::custom(ApiError::Unauthenticated)),
        }
    })
}
