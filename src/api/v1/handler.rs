use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub subject_id: SubjectId,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

pub async fn login(
    body: LoginRequest,
    session_authenticator: Arc<dyn SessionAuthenticator>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let login_input = LoginInput {
        username: body.username,
        password: body.password,
        metadata: body.metadata,
    };
    let issued = session_authenticator
        .login(login_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(issued)))
}

pub async fn refresh(
    token: String,
    session_authenticator: Arc<dyn SessionAuthenticator>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let issued = session_authenticator
        .refresh(&token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(issued)))
}

pub async fn logout(
    token: String,
    session_authenticator: Arc<dyn SessionAuthenticator>,
) -> Result<impl warp::Reply, warp::Rejection> {
    session_authenticator
        .logout(&token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(Empty {})))
}

pub async fn logout_all(
    token: String,
    session_authenticator: Arc<dyn SessionAuthenticator>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let revoked = session_authenticator
        .logout_all(&token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(LogoutAllResponse {
        revoked,
    })))
}

pub async fn session(subject_id: SubjectId) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(SessionResponse {
        subject_id,
    })))
}
