use axum::{extract::rejection::JsonRejection, extract::State, routing::post, Json, Router};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest},
        services,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let user = services::register(&state, payload).await?;
    let (token, user) = services::issue_session(&state, &user)?;
    Ok(Json(AuthResponse {
        message: "User registered successfully",
        token,
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload?;
    let user = services::login(&state, payload).await?;
    let (token, user) = services::issue_session(&state, &user)?;
    Ok(Json(AuthResponse {
        message: "Login successful",
        token,
        user,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::PublicUser;

    #[test]
    fn auth_response_serialization() {
        let response = AuthResponse {
            message: "Login successful",
            token: "t".into(),
            user: PublicUser {
                id: uuid::Uuid::new_v4(),
                email: "test@example.com".to_string(),
                name: "Test".to_string(),
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["message"], "Login successful");
        assert_eq!(json["user"]["email"], "test@example.com");
        assert_eq!(json["user"]["name"], "Test");
        assert!(json["user"].get("password_hash").is_none());
    }
}
