//! Feed endpoint: bundles joined with their writers, each carrying the
//! cards it contains.
//!
//! Assembled with two queries instead of one per bundle: first all bundle
//! rows, then every card/bundle link row for those bundles in a single IN
//! query, grouped by bundle id in memory.

use axum::{extract::State, Json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::{BundleResponse, BundleRow, CardBundleRow, CardSummary};
use crate::AppState;

use super::error::ApiError;

const BUNDLE_QUERY: &str = r#"
    SELECT b.id AS bundle_id, b.created_at, w.id AS writer_id,
           w.profile_image AS writer_profile_image, w.nickname AS writer_nickname,
           b.title, b.content, b.thumbnail, b.thumbnail_text
    FROM bundles b
    JOIN users w ON w.id = b.writer_id
    ORDER BY b.created_at DESC
"#;

/// List the feed
///
/// GET /api/v1/feeds
pub async fn list_feed(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BundleResponse>>, ApiError> {
    let bundles: Vec<BundleRow> = sqlx::query_as(BUNDLE_QUERY).fetch_all(&state.db).await?;

    let bundle_ids: Vec<String> = bundles.iter().map(|b| b.bundle_id.clone()).collect();
    let mut card_map = find_card_bundle_map(&state.db, &bundle_ids).await?;

    let feed = bundles
        .into_iter()
        .map(|row| {
            let cards = card_map.remove(&row.bundle_id).unwrap_or_default();
            BundleResponse::from_row(row, cards)
        })
        .collect();

    Ok(Json(feed))
}

/// Fetch all card rows for the given bundles in one query and group them
/// by bundle id.
async fn find_card_bundle_map(
    db: &crate::DbPool,
    bundle_ids: &[String],
) -> Result<HashMap<String, Vec<CardSummary>>, ApiError> {
    if bundle_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; bundle_ids.len()].join(", ");
    let sql = format!(
        r#"
        SELECT cb.bundle_id, c.id AS card_id, c.created_at, c.card_type,
               w.id AS writer_id, w.profile_image AS writer_profile_image,
               w.nickname AS writer_nickname, c.title, c.content,
               pc.id AS parent_category_id, pc.name AS parent_category_name,
               cat.id AS category_id, cat.name AS category_name,
               c.scrap_count, c.like_count, c.comment_count
        FROM card_bundles cb
        JOIN cards c ON c.id = cb.card_id
        JOIN users w ON w.id = c.writer_id
        JOIN categories cat ON cat.id = c.category_id
        LEFT JOIN categories pc ON pc.id = cat.parent_id
        WHERE cb.bundle_id IN ({placeholders})
        ORDER BY c.created_at
        "#
    );

    let mut query = sqlx::query_as::<_, CardBundleRow>(&sql);
    for id in bundle_ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(db).await?;

    let mut map: HashMap<String, Vec<CardSummary>> = HashMap::new();
    for row in rows {
        map.entry(row.bundle_id.clone())
            .or_default()
            .push(CardSummary::from(row));
    }
    Ok(map)
}
