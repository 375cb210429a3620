use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, RegisterRequest},
        jwt::Identity,
        password::{hash_password, verify_password},
        repo_types::{NewUser, User},
    },
    db::StoreError,
    error::AppError,
    state::AppState,
};

pub(crate) const BAD_CREDENTIALS: &str = "Invalid email or password";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Passwords are taken verbatim; only emptiness is rejected.
pub(crate) fn present_secret(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub(crate) fn checked_email(email: String) -> Result<String, AppError> {
    if is_valid_email(&email) {
        Ok(email)
    } else {
        warn!(email = %email, "invalid email");
        Err(AppError::Validation("Invalid email".into()))
    }
}

/// Mint a session token for `user` and the projection returned alongside it.
pub(crate) fn issue_session(st: &AppState, user: &User) -> Result<(String, PublicUser), AppError> {
    let identity = Identity {
        user_id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
    };
    let token = st.jwt.sign(&identity).map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign failed");
        AppError::internal(e)
    })?;
    Ok((token, PublicUser::from(user)))
}

pub async fn register(st: &AppState, req: RegisterRequest) -> Result<User, AppError> {
    let (Some(email), Some(password), Some(name)) = (
        present(req.email),
        present_secret(req.password),
        present(req.name),
    ) else {
        return Err(AppError::Validation(
            "Email, password, and name are required".into(),
        ));
    };
    let email = checked_email(email)?;

    if st
        .users
        .find_by_email(&email)
        .await
        .map_err(AppError::internal)?
        .is_some()
    {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("User with this email already exists".into()));
    }

    let password_hash = hash_password(&password).map_err(AppError::internal)?;
    let user = match st
        .users
        .create(NewUser {
            email,
            password_hash,
            name,
        })
        .await
    {
        Ok(u) => u,
        Err(StoreError::DuplicateKey) => {
            warn!("email registered concurrently");
            return Err(AppError::Conflict("User with this email already exists".into()));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(AppError::internal(e));
        }
    };

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

pub async fn login(st: &AppState, req: LoginRequest) -> Result<User, AppError> {
    let (Some(email), Some(password)) = (present(req.email), present_secret(req.password)) else {
        return Err(AppError::Validation("Email and password are required".into()));
    };

    let user = match st.users.find_by_email(&email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %email, "login unknown email");
            return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err(AppError::internal(e));
        }
    };

    let ok = verify_password(&password, &user.password_hash).map_err(AppError::internal)?;
    if !ok {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(user)
}
