use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite};

use super::Database;
use crate::filter::{fold, ArticleFilter};
use crate::pagination::{Page, PageRequest};

/// Storage format of `published_at`; sorts lexically in time order.
pub const PUBLISHED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ARTICLE_COLUMNS: &str =
    "id, title, author, description, content, published_at, source, category, url, url_to_image";

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published_at: String,
    pub source: String,
    pub category: Option<String>,
    pub url: String,
    pub url_to_image: Option<String>,
}

/// A normalized article as produced by an ingestion adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub published_at: NaiveDateTime,
    pub source: String,
    pub category: Option<String>,
    pub url: String,
    pub url_to_image: Option<String>,
}

impl Database {
    /// Insert the article, or overwrite every field of the row with the same URL.
    pub async fn upsert_article(&self, article: &NewArticle) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO articles (
                title, author, description, content, published_at,
                source, category, url, url_to_image,
                search_title, search_description, search_source, search_category, search_author,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                description = excluded.description,
                content = excluded.content,
                published_at = excluded.published_at,
                source = excluded.source,
                category = excluded.category,
                url_to_image = excluded.url_to_image,
                search_title = excluded.search_title,
                search_description = excluded.search_description,
                search_source = excluded.search_source,
                search_category = excluded.search_category,
                search_author = excluded.search_author,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&article.title)
        .bind(&article.author)
        .bind(&article.description)
        .bind(&article.content)
        .bind(article.published_at.format(PUBLISHED_AT_FORMAT).to_string())
        .bind(&article.source)
        .bind(&article.category)
        .bind(&article.url)
        .bind(&article.url_to_image)
        .bind(fold(&article.title))
        .bind(article.description.as_deref().map(fold))
        .bind(fold(&article.source))
        .bind(article.category.as_deref().map(fold))
        .bind(article.author.as_deref().map(fold))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_article(&self, id: i64) -> anyhow::Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    pub async fn count_articles(&self) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// One page of the articles matching `filter`, most recent first.
    pub async fn query_articles(
        &self,
        filter: &ArticleFilter,
        request: PageRequest,
    ) -> anyhow::Result<Page<Article>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM articles");
        filter.push_where(&mut count);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));
        filter.push_where(&mut select);
        select.push(" ORDER BY published_at DESC, id DESC LIMIT ");
        select.push_bind(request.limit());
        select.push(" OFFSET ");
        select.push_bind(request.offset());

        let items = select
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(items, total, request))
    }
}
