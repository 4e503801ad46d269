//! Profile, user administration and category curation endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{Category, CreateCategoryRequest, User, UserResponse};
use crate::AppState;

use super::error::ApiError;
use super::validation::validate_category_name;

/// Current user's profile
///
/// GET /api/v1/auth/user/me
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// List all users
///
/// GET /api/v1/auth/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Delete a user
///
/// DELETE /api/v1/auth/admin/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    caller: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if caller.id == id {
        return Err(ApiError::bad_request("Cannot delete your own account"));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::user_not_found());
    }

    tracing::info!(user_id = %id, deleted_by = %caller.id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// List categories
///
/// GET /api/v1/auth/manager/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    let categories: Vec<Category> = sqlx::query_as("SELECT * FROM categories ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(categories))
}

/// Create a category, optionally nested under a parent
///
/// POST /api/v1/auth/manager/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    if let Err(e) = validate_category_name(&req.name) {
        return Err(ApiError::validation_field("name", e));
    }

    if let Some(ref parent_id) = req.parent_id {
        let parent: Option<Category> =
            sqlx::query_as("SELECT * FROM categories WHERE id = ?")
                .bind(parent_id)
                .fetch_optional(&state.db)
                .await?;

        let parent = parent.ok_or_else(|| ApiError::not_found("Parent category not found"))?;

        // The taxonomy is two levels deep: parent and child
        if parent.parent_id.is_some() {
            return Err(ApiError::bad_request(
                "Categories can only be nested one level deep",
            ));
        }
    }

    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO categories (id, name, parent_id) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(&req.name)
        .bind(&req.parent_id)
        .execute(&state.db)
        .await?;

    let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(category_id = %category.id, name = %category.name, "Category created");

    Ok((StatusCode::CREATED, Json(category)))
}
