use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::Database;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PasswordReset {
    pub email: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Emails are stored and compared trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Whether `error` wraps a UNIQUE constraint violation from the database.
pub fn is_unique_violation(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<sqlx::Error>()
        .and_then(sqlx::Error::as_database_error)
        .is_some_and(|e| e.is_unique_violation())
}

impl Database {
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            "INSERT INTO users (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(normalize_email(email))
        .bind(password_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn update_password(&self, user_id: i64, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_token(&self, user_id: i64, token_hash: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO access_tokens (user_id, token_hash, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(token_hash)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_user_by_token(&self, token_hash: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT users.* FROM users
            JOIN access_tokens ON access_tokens.user_id = users.id
            WHERE access_tokens.token_hash = ?
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Delete every access token of the user, returning how many were revoked.
    pub async fn revoke_tokens(&self, user_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM access_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[cfg(test)]
    pub async fn count_tokens(&self, user_id: i64) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM access_tokens WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Store a reset token for `email`, discarding any earlier one.
    pub async fn replace_password_reset(
        &self,
        email: &str,
        token_hash: &str,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO password_resets (email, token_hash, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                token_hash = excluded.token_hash,
                created_at = excluded.created_at
            "#,
        )
        .bind(normalize_email(email))
        .bind(token_hash)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_password_reset(&self, email: &str) -> anyhow::Result<Option<PasswordReset>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT email, token_hash, created_at FROM password_resets WHERE email = ?",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(email, token_hash, created_at)| {
            let created_at = DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc);
            Ok::<_, anyhow::Error>(PasswordReset {
                email,
                token_hash,
                created_at,
            })
        })
        .transpose()
    }

    pub async fn delete_password_reset(&self, email: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM password_resets WHERE email = ?")
            .bind(normalize_email(email))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use chrono::Duration;

    mod user_tests {
        use super::*;

        #[tokio::test]
        async fn test_create_and_find_user() {
            let db = create_test_db().await;
            let id = db
                .create_user("Jane", "jane@example.com", "hash")
                .await
                .unwrap();

            let user = db.find_user_by_email("jane@example.com").await.unwrap().unwrap();
            assert_eq!(user.id, id);
            assert_eq!(user.name, "Jane");
            assert_eq!(user.password_hash, "hash");
        }

        #[tokio::test]
        async fn test_duplicate_email_is_rejected() {
            let db = create_test_db().await;
            db.create_user("Jane", "jane@example.com", "hash")
                .await
                .unwrap();

            let result = db.create_user("Other", "jane@example.com", "hash").await;
            assert!(result.is_err());
        }

        #[tokio::test]
        async fn test_email_case_is_one_identity() {
            let db = create_test_db().await;
            let id = db
                .create_user("Jane", " Jane@Example.COM ", "hash")
                .await
                .unwrap();

            let user = db.find_user_by_email("jane@example.com").await.unwrap().unwrap();
            assert_eq!(user.id, id);
            assert_eq!(user.email, "jane@example.com");
            assert!(db.find_user_by_email("JANE@example.com").await.unwrap().is_some());

            let err = db
                .create_user("Other", "jane@EXAMPLE.com", "hash")
                .await
                .unwrap_err();
            assert!(is_unique_violation(&err));
        }

        #[test]
        fn test_other_errors_are_not_unique_violations() {
            assert!(!is_unique_violation(&anyhow::anyhow!("boom")));
        }

        #[tokio::test]
        async fn test_update_password() {
            let db = create_test_db().await;
            let id = db
                .create_user("Jane", "jane@example.com", "old")
                .await
                .unwrap();

            db.update_password(id, "new").await.unwrap();

            let user = db.find_user_by_email("jane@example.com").await.unwrap().unwrap();
            assert_eq!(user.password_hash, "new");
        }
    }

    mod token_tests {
        use super::*;

        #[tokio::test]
        async fn test_token_lookup() {
            let db = create_test_db().await;
            let id = db
                .create_user("Jane", "jane@example.com", "hash")
                .await
                .unwrap();
            db.create_token(id, "digest-1").await.unwrap();

            let user = db.find_user_by_token("digest-1").await.unwrap().unwrap();
            assert_eq!(user.id, id);
            assert!(db.find_user_by_token("digest-2").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_revoke_only_affects_owner() {
            let db = create_test_db().await;
            let jane = db
                .create_user("Jane", "jane@example.com", "hash")
                .await
                .unwrap();
            let john = db
                .create_user("John", "john@example.com", "hash")
                .await
                .unwrap();
            db.create_token(jane, "jane-1").await.unwrap();
            db.create_token(jane, "jane-2").await.unwrap();
            db.create_token(john, "john-1").await.unwrap();

            assert_eq!(db.revoke_tokens(jane).await.unwrap(), 2);
            assert_eq!(db.count_tokens(jane).await.unwrap(), 0);
            assert_eq!(db.count_tokens(john).await.unwrap(), 1);
        }
    }

    mod password_reset_tests {
        use super::*;

        #[tokio::test]
        async fn test_replace_keeps_latest_token() {
            let db = create_test_db().await;
            let earlier = Utc::now() - Duration::minutes(10);
            db.replace_password_reset("jane@example.com", "first", earlier)
                .await
                .unwrap();
            db.replace_password_reset("jane@example.com", "second", Utc::now())
                .await
                .unwrap();

            let reset = db
                .find_password_reset("jane@example.com")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reset.token_hash, "second");
            assert!(reset.created_at > earlier);
        }

        #[tokio::test]
        async fn test_delete_password_reset() {
            let db = create_test_db().await;
            db.replace_password_reset("jane@example.com", "digest", Utc::now())
                .await
                .unwrap();
            db.delete_password_reset("jane@example.com").await.unwrap();

            assert!(db
                .find_password_reset("jane@example.com")
                .await
                .unwrap()
                .is_none());
        }
    }
}
