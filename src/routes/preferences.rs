use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{AppState, AuthUser};
use crate::db::{Article, Database, Preferences};
use crate::error::ApiError;
use crate::filter::ArticleFilter;
use crate::pagination::{PageMeta, PageRequest, FEED_PER_PAGE};

/// Absent or null keys keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct PreferencesPatch {
    pub sources: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
}

impl PreferencesPatch {
    fn apply(self, preferences: &mut Preferences) {
        if let Some(sources) = self.sources {
            preferences.sources = sources;
        }
        if let Some(categories) = self.categories {
            preferences.categories = categories;
        }
        if let Some(authors) = self.authors {
            preferences.authors = authors;
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Feed {
    pub articles: Vec<Article>,
    pub pagination: PageMeta,
}

async fn load_or_create(db: &Database, user_id: i64) -> anyhow::Result<Preferences> {
    if let Some(preferences) = db.find_preferences(user_id).await? {
        return Ok(preferences);
    }

    let preferences = Preferences::default();
    db.save_preferences(user_id, &preferences).await?;
    info!("Created empty preferences for user {}", user_id);
    Ok(preferences)
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Preferences>, ApiError> {
    Ok(Json(load_or_create(&state.db, user.id).await?))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<PreferencesPatch>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(patch) = payload?;

    let mut preferences = load_or_create(&state.db, user.id).await?;
    patch.apply(&mut preferences);
    state.db.save_preferences(user.id, &preferences).await?;
    info!("Updated preferences for user {}", user.id);

    Ok(Json(json!({
        "message": "Preferences updated successfully",
        "preferences": preferences
    })))
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    state
        .db
        .save_preferences(user.id, &Preferences::default())
        .await?;
    info!("Reset preferences for user {}", user.id);

    Ok(Json(json!({ "message": "Preferences reset successfully" })))
}

/// Most recent articles matching any stored preference in every non-empty
/// dimension. Users without preferences see every article.
pub async fn feed(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Feed>, ApiError> {
    let preferences = load_or_create(&state.db, user.id).await?;
    if !preferences.has_any() {
        debug!("User {} has no preferences, serving unfiltered feed", user.id);
    }
    let filter = ArticleFilter::from_preferences(&preferences);
    let request = PageRequest::parse(
        query.page.as_deref(),
        query.per_page.as_deref(),
        FEED_PER_PAGE,
    );

    let page = state.db.query_articles(&filter, request).await?;

    Ok(Json(Feed {
        articles: page.items,
        pagination: page.meta,
    }))
}
