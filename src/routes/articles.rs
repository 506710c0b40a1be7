use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;

use super::AppState;
use crate::db::Article;
use crate::error::ApiError;
use crate::filter::{ArticleFilter, ArticleQuery};
use crate::pagination::{PageMeta, PageRequest, ARTICLES_PER_PAGE};

#[derive(Debug, Serialize)]
pub struct ArticleList {
    pub data: Vec<Article>,
    pub meta: PageMeta,
}

#[derive(Debug, Serialize)]
pub struct ArticleResource {
    pub data: Article,
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ArticleQuery>,
) -> Result<Json<ArticleList>, ApiError> {
    let filter = ArticleFilter::from_query(&query)?;
    let request = PageRequest::parse(query.page.as_deref(), None, ARTICLES_PER_PAGE);

    let page = state.db.query_articles(&filter, request).await?;

    Ok(Json(ArticleList {
        data: page.items,
        meta: page.meta,
    }))
}

pub async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ArticleResource>, ApiError> {
    const NOT_FOUND: ApiError = ApiError::NotFound("Article not found");

    let id: i64 = id.parse().map_err(|_| NOT_FOUND)?;
    let article = state.db.get_article(id).await?.ok_or(NOT_FOUND)?;

    Ok(Json(ArticleResource { data: article }))
}
