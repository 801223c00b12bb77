use anyhow::Result;
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_subscription_row;

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, template_id, subscriber, subscribe, created_at, updated_at
    FROM template_subscriptions
"#;

/// TemplateSubscription database operations
pub struct SubscriptionRepo;

impl SubscriptionRepo {
    /// Single atomic upsert keyed on (template, subscriber): a new pair
    /// inserts, an existing one only updates the subscribe flag.
    pub async fn upsert(
        pool: &Pool<Sqlite>,
        template_id: &str,
        subscriber: &str,
        subscribe: bool,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO template_subscriptions (id, template_id, subscriber, subscribe,
                                                created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (template_id, subscriber)
            DO UPDATE SET subscribe = excluded.subscribe, updated_at = excluded.updated_at
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(template_id)
        .bind(subscriber)
        .bind(subscribe as i64)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(
        pool: &Pool<Sqlite>,
        template_id: &str,
        subscriber: &str,
    ) -> Result<Option<TemplateSubscription>> {
        let row = sqlx::query(&format!(
            "{} WHERE template_id = ? AND subscriber = ?",
            SELECT_SUBSCRIPTION
        ))
        .bind(template_id)
        .bind(subscriber)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(map_subscription_row))
    }

    /// Active subscribers of a template, notified on change/delete.
    pub async fn list_subscribed(
        pool: &Pool<Sqlite>,
        template_id: &str,
    ) -> Result<Vec<TemplateSubscription>> {
        let rows = sqlx::query(&format!(
            "{} WHERE template_id = ? AND subscribe = 1 ORDER BY subscriber",
            SELECT_SUBSCRIPTION
        ))
        .bind(template_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(map_subscription_row).collect())
    }
}
