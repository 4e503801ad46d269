//! Feed content models: bundles, cards, categories and the DTOs the feed
//! endpoint assembles from them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// A bundle row joined with its writer, as returned by the first feed query
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BundleRow {
    pub bundle_id: String,
    pub created_at: String,
    pub writer_id: String,
    pub writer_profile_image: Option<String>,
    pub writer_nickname: String,
    pub title: String,
    pub content: String,
    pub thumbnail: Option<String>,
    pub thumbnail_text: Option<String>,
}

/// A card/bundle link row joined with the card, its writer and its category
/// hierarchy, as returned by the second feed query
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CardBundleRow {
    pub bundle_id: String,
    pub card_id: String,
    pub created_at: String,
    pub card_type: String,
    pub writer_id: String,
    pub writer_profile_image: Option<String>,
    pub writer_nickname: String,
    pub title: String,
    pub content: String,
    pub parent_category_id: Option<String>,
    pub parent_category_name: Option<String>,
    pub category_id: String,
    pub category_name: String,
    pub scrap_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

/// A card as it appears inside a feed bundle
#[derive(Debug, Clone, Serialize)]
pub struct CardSummary {
    pub card_id: String,
    pub created_at: String,
    pub card_type: String,
    pub writer_id: String,
    pub writer_profile_image: Option<String>,
    pub writer_nickname: String,
    pub title: String,
    pub content: String,
    pub parent_category_id: Option<String>,
    pub parent_category_name: Option<String>,
    pub category_id: String,
    pub category_name: String,
    pub scrap_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
}

impl From<CardBundleRow> for CardSummary {
    fn from(row: CardBundleRow) -> Self {
        Self {
            card_id: row.card_id,
            created_at: row.created_at,
            card_type: row.card_type,
            writer_id: row.writer_id,
            writer_profile_image: row.writer_profile_image,
            writer_nickname: row.writer_nickname,
            title: row.title,
            content: row.content,
            parent_category_id: row.parent_category_id,
            parent_category_name: row.parent_category_name,
            category_id: row.category_id,
            category_name: row.category_name,
            scrap_count: row.scrap_count,
            like_count: row.like_count,
            comment_count: row.comment_count,
        }
    }
}

/// A feed entry: one bundle with all the cards it contains
#[derive(Debug, Clone, Serialize)]
pub struct BundleResponse {
    pub bundle_id: String,
    pub created_at: String,
    pub writer_id: String,
    pub writer_profile_image: Option<String>,
    pub writer_nickname: String,
    pub title: String,
    pub content: String,
    pub thumbnail: Option<String>,
    pub thumbnail_text: Option<String>,
    pub cards: Vec<CardSummary>,
}

impl BundleResponse {
    pub fn from_row(row: BundleRow, cards: Vec<CardSummary>) -> Self {
        Self {
            bundle_id: row.bundle_id,
            created_at: row.created_at,
            writer_id: row.writer_id,
            writer_profile_image: row.writer_profile_image,
            writer_nickname: row.writer_nickname,
            title: row.title,
            content: row.content,
            thumbnail: row.thumbnail,
            thumbnail_text: row.thumbnail_text,
            cards,
        }
    }
}
