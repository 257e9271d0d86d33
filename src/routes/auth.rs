use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use uuid::Uuid;

use super::utils::{auth_guard, check_password, validate_auth_token};
use crate::config::Config;
use crate::db::auth::AuthRepository;
use crate::error::AppError;
use crate::validation::{Validate, Validator};

const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    sub: Uuid, // user_id
    exp: i64,  // expiration timestamp
    iat: i64,  // issued at timestamp
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: Email,
    password: String,
    full_name: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), AppError> {
        let mut validator = Validator::new();
        validator.required("full_name", &self.full_name);
        check_password(&mut validator, &self.password).finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: Email,
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    pub user_uid: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    refresh_token: String,
}

impl Validate for RefreshTokenRequest {
    fn validate(&self) -> Result<(), AppError> {
        Validator::new()
            .required("refresh_token", &self.refresh_token)
            .finish()
    }
}

// Authentication service
pub struct AuthService {
    pub repo: AuthRepository,
    jwt_secret: String,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl AuthService {
    pub fn new(repo: AuthRepository, config: &Config) -> Self {
        Self {
            repo,
            jwt_secret: config.jwt_secret.clone(),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AppError> {
        req.validate()?;

        let salt = SaltString::generate(&mut rand::thread_rng());
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|err| AppError::Internal(format!("unable to hash password: {err}")))?
            .to_string();

        let user = self
            .repo
            .create_user(req.email.as_str(), &password_hash, req.full_name.trim())
            .await?;
        tracing::info!("user created with email: {}", user.email);

        self.issue_tokens(user.id).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AppError> {
        tracing::info!("attempting to log in user with email: {}", req.email);

        let user = self
            .repo
            .find_user_by_email(req.email.as_str())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|err| AppError::Internal(format!("stored password hash unreadable: {err}")))?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("invalid credentials for user: {}", user.email);
            return Err(AppError::InvalidCredentials);
        }

        self.issue_tokens(user.id).await
    }

    pub fn verify_token(&self, token: &str) -> Result<Uuid, AppError> {
        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.leeway = 10;
        validation.validate_exp = true;

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::debug!("rejected token: {:?}", err);
            AppError::Unauthorized("invalid token".to_string())
        })?;

        Ok(token_data.claims.sub)
    }

    /// Exchanges a refresh token for a fresh pair. The old refresh token is
    /// consumed, so each one works once.
    pub async fn refresh_token(&self, req: RefreshTokenRequest) -> Result<AuthResponse, AppError> {
        req.validate()?;

        let user_id = self
            .repo
            .take_refresh_token(&req.refresh_token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid refresh token".to_string()))?;

        self.issue_tokens(user_id).await
    }

    pub async fn logout(&self, user_id: Uuid, req: RefreshTokenRequest) -> Result<(), AppError> {
        req.validate()?;

        if !self
            .repo
            .delete_refresh_token(user_id, &req.refresh_token)
            .await?
        {
            return Err(AppError::Unauthorized("invalid refresh token".to_string()));
        }
        Ok(())
    }

    pub fn access_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            exp: (now + self.access_token_ttl).timestamp(),
            iat: now.timestamp(),
        };

        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|err| AppError::Internal(format!("unable to sign token: {err}")))
    }

    async fn issue_tokens(&self, user_id: Uuid) -> Result<AuthResponse, AppError> {
        let access_token = self.access_token(user_id)?;

        let refresh_token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + self.refresh_token_ttl;
        self.repo
            .store_refresh_token(user_id, &refresh_token, expires_at)
            .await?;
        tracing::info!("stored refresh token for user: {}", user_id);

        Ok(AuthResponse {
            access_token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.access_token_ttl.as_secs(),
            refresh_token,
            user_uid: user_id,
        })
    }
}

// Route for handling new user registration
pub async fn register_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = service.register(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

// Route for handling user login
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = service.login(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

// Route for handling token refresh
pub async fn refresh_token_handler(
    State(service): State<Arc<AuthService>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = service.refresh_token(req).await?;
    Ok((StatusCode::OK, Json(response)))
}

pub async fn logout_handler(
    State(service): State<Arc<AuthService>>,
    headers: HeaderMap,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = validate_auth_token(&headers, &service)?;
    service.logout(user_id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn auth_routes(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_token_handler))
        .route("/auth/logout", post(logout_handler).route_layer(auth_guard()))
        .with_state(service)
}
