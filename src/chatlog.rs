//! Chat persistence.
//!
//! Chats and their messages live in sqlite. A user message is stored before
//! the model call; the assistant message is stored only once its stream has
//! fully completed, so an interrupted stream never leaves a partial
//! assistant turn behind.

use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A persisted chat message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

/// Create a new chat and return its id.
pub async fn create_chat(pool: &SqlitePool, title: Option<&str>) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO chats (id, title, created_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(title)
        .bind(Utc::now().timestamp_millis())
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn chat_exists(pool: &SqlitePool, chat_id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM chats WHERE id = ?")
        .bind(chat_id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Append a message to a chat and return the message id.
pub async fn append_message(
    pool: &SqlitePool,
    chat_id: &str,
    role: &str,
    content: &str,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO messages (id, chat_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(chat_id)
        .bind(role)
        .bind(content)
        .bind(Utc::now().timestamp_millis())
        .execute(pool)
        .await?;
    Ok(id)
}

/// All messages in a chat, oldest first.
pub async fn list_messages(pool: &SqlitePool, chat_id: &str) -> Result<Vec<StoredMessage>> {
    let rows = sqlx::query(
        "SELECT id, role, content, created_at FROM messages WHERE chat_id = ? ORDER BY created_at, rowid",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| StoredMessage {
            id: row.get("id"),
            role: row.get("role"),
            content: row.get("content"),
            created_at: row.get("created_at"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_memory;
    use crate::migrate::run_migrations_on;

    async fn test_pool() -> SqlitePool {
        let pool = connect_memory().await.unwrap();
        run_migrations_on(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_and_check_existence() {
        let pool = test_pool().await;
        let id = create_chat(&pool, Some("Calculus review")).await.unwrap();
        assert!(chat_exists(&pool, &id).await.unwrap());
        assert!(!chat_exists(&pool, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn messages_come_back_oldest_first() {
        let pool = test_pool().await;
        let chat = create_chat(&pool, None).await.unwrap();

        append_message(&pool, &chat, "user", "What is a derivative?")
            .await
            .unwrap();
        append_message(&pool, &chat, "assistant", "The rate of change.")
            .await
            .unwrap();

        let messages = list_messages(&pool, &chat).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "The rate of change.");
    }

    #[tokio::test]
    async fn chats_do_not_share_messages() {
        let pool = test_pool().await;
        let a = create_chat(&pool, None).await.unwrap();
        let b = create_chat(&pool, None).await.unwrap();
        append_message(&pool, &a, "user", "only in a").await.unwrap();

        assert_eq!(list_messages(&pool, &a).await.unwrap().len(), 1);
        assert!(list_messages(&pool, &b).await.unwrap().is_empty());
    }
}
