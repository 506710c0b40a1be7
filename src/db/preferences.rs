use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::Database;

/// A user's feed preferences. An empty list places no restriction on that dimension.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub sources: Vec<String>,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
}

impl Preferences {
    pub fn has_any(&self) -> bool {
        !(self.sources.is_empty() && self.categories.is_empty() && self.authors.is_empty())
    }
}

impl Database {
    /// The stored preferences, without creating a record.
    pub async fn find_preferences(&self, user_id: i64) -> anyhow::Result<Option<Preferences>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT sources, categories, authors FROM user_preferences WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(sources, categories, authors)| {
            Ok::<_, anyhow::Error>(Preferences {
                sources: serde_json::from_str(&sources)?,
                categories: serde_json::from_str(&categories)?,
                authors: serde_json::from_str(&authors)?,
            })
        })
        .transpose()
    }

    /// Create or replace the single preference record of `user_id`.
    pub async fn save_preferences(
        &self,
        user_id: i64,
        preferences: &Preferences,
    ) -> anyhow::Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, sources, categories, authors, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                sources = excluded.sources,
                categories = excluded.categories,
                authors = excluded.authors,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_string(&preferences.sources)?)
        .bind(serde_json::to_string(&preferences.categories)?)
        .bind(serde_json::to_string(&preferences.authors)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
