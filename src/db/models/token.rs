//! Stored refresh token model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The single live refresh token for a user. Overwritten on every login and
/// refresh, deleted on logout.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRefreshToken {
    pub user_id: String,
    pub refresh_token: String,
    pub updated_at: String,
}
