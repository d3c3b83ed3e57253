use super::error::*;
use super::handler;
use crate::application_port::SessionAuthenticator;
use crate::domain_model::SubjectId;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;

/// `/api/v1/...` with error recovery applied.
pub fn api(
    session_authenticator: Arc<dyn SessionAuthenticator>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    warp::path("api")
        .and(warp::path("v1"))
        .and(routes(session_authenticator))
        .recover(recover_error)
}

pub fn routes(
    session_authenticator: Arc<dyn SessionAuthenticator>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let login = warp::post()
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(session_authenticator.clone()))
        .and_then(handler::login);

    let refresh = warp::post()
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(bearer_token())
        .and(with(session_authenticator.clone()))
        .and_then(handler::refresh);

    let logout = warp::post()
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(bearer_token())
        .and(with(session_authenticator.clone()))
        .and_then(handler::logout);

    let logout_all = warp::post()
        .and(warp::path("logout_all"))
        .and(warp::path::end())
        .and(bearer_token())
        .and(with(session_authenticator.clone()))
        .and_then(handler::logout_all);

    let session = warp::get()
        .and(warp::path("session"))
        .and(warp::path::end())
        .and(with_verification(session_authenticator))
        .and_then(handler::session);

    login.or(refresh).or(logout).or(logout_all).or(session)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// Raw token from `Authorization: Bearer <token>`.
fn bearer_token() -> impl Filter<Extract = (String,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(http::header::AUTHORIZATION.as_ref()).and_then(
        |header: Option<String>| async move {
            header
                .as_deref()
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
                .filter(|token| !token.is_empty())
                .ok_or_else(|| reject::custom(ApiErrorCode::Unauthenticated))
        },
    )
}

fn with_verification(
    session_authenticator: Arc<dyn SessionAuthenticator>,
) -> impl Filter<Extract = (SubjectId,), Error = warp::Rejection> + Clone {
    bearer_token().and_then(move |token: String| {
        let session_authenticator = session_authenticator.clone();
        async move {
            let subject_id = session_authenticator
                .authenticate(&token)
                .await
                .map_err(ApiErrorCode::from)
                .map_err(reject::custom)?;
            Ok::<_, warp::Rejection>(subject_id)
        }
    })
}
