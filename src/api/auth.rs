//! Authentication endpoints and route guards.
//!
//! Login mints an access/refresh token pair and stores the refresh token
//! keyed by user id (overwritten, never appended). Refresh validates the
//! presented token, compares it against the stored one and reissues the
//! pair. Logout deletes the stored token.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::auth::{self, Role, TokenUse};
use crate::db::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, SignupRequest, User,
    UserRefreshToken, UserResponse,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{validate_email, validate_nickname, validate_password};

/// Extract the bearer token from request headers
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Constant-time equality for refresh tokens
fn tokens_match(presented: &str, stored: &str) -> bool {
    presented.len() == stored.len()
        && presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Store or overwrite the single refresh token row for a user
async fn store_refresh_token(
    db: &crate::DbPool,
    user_id: &str,
    refresh_token: &str,
) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO user_refresh_tokens (user_id, refresh_token, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            refresh_token = excluded.refresh_token,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(refresh_token)
    .bind(&now)
    .execute(db)
    .await?;
    Ok(())
}

fn validate_signup(req: &SignupRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validate_nickname(&req.nickname) {
        errors.add("nickname", e);
    }
    if let Err(e) = validate_password(&req.password) {
        errors.add("password", e);
    }

    errors.finish()
}

/// Register a new user
///
/// POST /api/v1/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_signup(&req)?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    if existing.is_some() {
        return Err(ApiError::user_already_exists());
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let password_hash = auth::hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO users (id, email, nickname, password_hash, role, introduction, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&req.email)
    .bind(&req.nickname)
    .bind(&password_hash)
    .bind(Role::User.as_str())
    .bind(&req.introduction)
    .bind(&now)
    .bind(&now)
    .execute(&state.db)
    .await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(user_id = %user.id, "User signed up");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login endpoint
///
/// POST /api/v1/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !auth::verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let pair = state
        .tokens
        .create_pair(&user.id)
        .map_err(|_| ApiError::internal("Failed to issue tokens"))?;

    store_refresh_token(&state.db, &user.id, &pair.refresh_token).await?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user_id: user.id,
        email: user.email,
        nickname: user.nickname,
    }))
}

/// Exchange a refresh token for a new token pair
///
/// POST /api/v1/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    // Signature, expiry and token-use check
    let claims = state
        .tokens
        .verify(&req.refresh_token, TokenUse::Refresh)
        .map_err(|_| ApiError::refresh_token_invalid())?;

    // The user referenced by the token must still exist
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(ApiError::user_not_found)?;

    // There must be a stored refresh token for this user
    let stored: Option<UserRefreshToken> =
        sqlx::query_as("SELECT * FROM user_refresh_tokens WHERE user_id = ?")
            .bind(&user.id)
            .fetch_optional(&state.db)
            .await?;
    let stored = stored.ok_or_else(ApiError::refresh_token_not_found)?;

    // The presented token must match the stored one exactly
    if !tokens_match(&req.refresh_token, &stored.refresh_token) {
        tracing::warn!(user_id = %user.id, "Refresh token mismatch");
        return Err(ApiError::refresh_token_invalid());
    }

    // Reissue the pair and overwrite the stored refresh token
    let pair = state
        .tokens
        .create_pair(&user.id)
        .map_err(|_| ApiError::internal("Failed to issue tokens"))?;

    store_refresh_token(&state.db, &user.id, &pair.refresh_token).await?;

    tracing::info!(user_id = %user.id, "Tokens refreshed");

    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

/// Revoke the caller's refresh token
///
/// POST /api/v1/auth/user/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM user_refresh_tokens WHERE user_id = ?")
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::refresh_token_not_found());
    }

    tracing::info!(user_id = %user.id, "User logged out");

    Ok(StatusCode::NO_CONTENT)
}

/// Resolve the current user from a bearer access token
pub async fn get_current_user(
    db: &crate::DbPool,
    tokens: &crate::auth::TokenProvider,
    token: &str,
) -> Result<User, ApiError> {
    let claims = tokens
        .verify(token, TokenUse::Access)
        .map_err(|_| ApiError::unauthorized("Invalid or expired access token"))?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(db)
        .await?;

    user.ok_or_else(ApiError::user_not_found)
}

/// Shared guard body for the role middlewares
async fn guard(
    state: Arc<AppState>,
    mut req: Request<Body>,
    next: Next,
    required: Role,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?
        .to_string();

    let user = get_current_user(&state.db, &state.tokens, &token).await?;

    let role = Role::parse(&user.role)
        .ok_or_else(|| ApiError::internal("User has an unknown role"))?;

    if !role.satisfies(required) {
        return Err(ApiError::forbidden("Insufficient role"));
    }

    // Make the authenticated user available to handlers
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Gate for /api/v1/auth/user/** — any authenticated role
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    guard(state, req, next, Role::User).await
}

/// Gate for /api/v1/auth/manager/** — manager or admin
pub async fn require_manager(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    guard(state, req, next, Role::Manager).await
}

/// Gate for /api/v1/auth/admin/** — admin only
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    guard(state, req, next, Role::Admin).await
}

/// Extractor for the current authenticated user.
///
/// Inside a gated subtree the guard has already attached the user to the
/// request; elsewhere the bearer token is resolved directly.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(user.clone());
        }

        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?
            .to_string();
        get_current_user(&state.db, &state.tokens, &token).await
    }
}

/// Ensure the bootstrap admin account exists
pub async fn ensure_admin_user(
    db: &crate::DbPool,
    email: &str,
    password: &str,
) -> anyhow::Result<()> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let password_hash = auth::hash_password(password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;

    sqlx::query(
        r#"
        INSERT INTO users (id, email, nickname, password_hash, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind("admin")
    .bind(&password_hash)
    .bind(Role::Admin.as_str())
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;

    tracing::info!(email = %email, "Created bootstrap admin user");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::http::HeaderValue;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_state() -> Arc<AppState> {
        // A single connection keeps the in-memory database alive and shared
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();

        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        Arc::new(AppState::new(config, pool))
    }

    fn signup_req(email: &str) -> SignupRequest {
        SignupRequest {
            email: email.to_string(),
            nickname: "reader".to_string(),
            password: "sturdy-pass1".to_string(),
            introduction: None,
        }
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("same-token", "same-token"));
        assert!(!tokens_match("same-token", "same-tokeX"));
        assert!(!tokens_match("short", "much longer token"));
    }

    #[tokio::test]
    async fn test_signup_then_duplicate_conflicts() {
        let state = test_state().await;

        let (status, Json(user)) = signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user.role, "user");

        let err = signup(State(state), Json(signup_req("a@example.com")))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_signup_rejects_weak_input() {
        let state = test_state().await;

        let mut req = signup_req("a@example.com");
        req.password = "short".to_string();
        let err = signup(State(state), Json(req)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_issues_pair_and_stores_refresh_token() {
        let state = test_state().await;
        signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();

        let Json(resp) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "a@example.com".to_string(),
                password: "sturdy-pass1".to_string(),
            }),
        )
        .await
        .unwrap();

        let stored: UserRefreshToken =
            sqlx::query_as("SELECT * FROM user_refresh_tokens WHERE user_id = ?")
                .bind(&resp.user_id)
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(stored.refresh_token, resp.refresh_token);
    }

    #[tokio::test]
    async fn test_login_overwrites_previous_refresh_token() {
        let state = test_state().await;
        signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();

        let login_req = || {
            Json(LoginRequest {
                email: "a@example.com".to_string(),
                password: "sturdy-pass1".to_string(),
            })
        };

        let Json(first) = login(State(state.clone()), login_req()).await.unwrap();
        let Json(second) = login(State(state.clone()), login_req()).await.unwrap();

        // At most one live refresh token per user
        let rows: Vec<UserRefreshToken> =
            sqlx::query_as("SELECT * FROM user_refresh_tokens WHERE user_id = ?")
                .bind(&first.user_id)
                .fetch_all(&state.db)
                .await
                .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let state = test_state().await;
        signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();

        let err = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "a@example.com".to_string(),
                password: "wrong-pass1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = login(
            State(state),
            Json(LoginRequest {
                email: "nobody@example.com".to_string(),
                password: "sturdy-pass1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_rotates_tokens() {
        let state = test_state().await;
        signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();
        let Json(login_resp) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "a@example.com".to_string(),
                password: "sturdy-pass1".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(refreshed) = refresh(
            State(state.clone()),
            Json(RefreshRequest {
                refresh_token: login_resp.refresh_token.clone(),
            }),
        )
        .await
        .unwrap();

        // Old refresh token was overwritten; replaying it must fail
        let err = refresh(
            State(state.clone()),
            Json(RefreshRequest {
                refresh_token: login_resp.refresh_token.clone(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        // The newly issued token works
        refresh(
            State(state),
            Json(RefreshRequest {
                refresh_token: refreshed.refresh_token.clone(),
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let state = test_state().await;
        signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();
        let Json(login_resp) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "a@example.com".to_string(),
                password: "sturdy-pass1".to_string(),
            }),
        )
        .await
        .unwrap();

        let err = refresh(
            State(state),
            Json(RefreshRequest {
                refresh_token: login_resp.access_token,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_without_stored_token_not_found() {
        let state = test_state().await;
        let (_, Json(user)) = signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();

        // A valid refresh token the server never stored (e.g. after logout)
        let pair = state.tokens.create_pair(&user.id).unwrap();
        let err = refresh(
            State(state),
            Json(RefreshRequest {
                refresh_token: pair.refresh_token,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logout_deletes_stored_token() {
        let state = test_state().await;
        signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();
        let Json(login_resp) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "a@example.com".to_string(),
                password: "sturdy-pass1".to_string(),
            }),
        )
        .await
        .unwrap();

        let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&login_resp.user_id)
            .fetch_one(&state.db)
            .await
            .unwrap();

        let status = logout(State(state.clone()), user.clone()).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        // Second logout finds nothing to revoke
        let err = logout(State(state), user).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ensure_admin_user_is_idempotent() {
        let state = test_state().await;

        ensure_admin_user(&state.db, "root@example.com", "sturdy-pass1")
            .await
            .unwrap();
        ensure_admin_user(&state.db, "root@example.com", "sturdy-pass1")
            .await
            .unwrap();

        let rows: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
            .bind("root@example.com")
            .fetch_all(&state.db)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, "admin");
    }

    #[tokio::test]
    async fn test_get_current_user() {
        let state = test_state().await;
        let (_, Json(user)) = signup(State(state.clone()), Json(signup_req("a@example.com")))
            .await
            .unwrap();

        let pair = state.tokens.create_pair(&user.id).unwrap();
        let resolved = get_current_user(&state.db, &state.tokens, &pair.access_token)
            .await
            .unwrap();
        assert_eq!(resolved.id, user.id);

        // A refresh token is not an access token
        let err = get_current_user(&state.db, &state.tokens, &pair.refresh_token)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
