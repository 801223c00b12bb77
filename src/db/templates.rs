use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_template_row;

const SELECT_TEMPLATE: &str = r#"
    SELECT id, name, description, backend, type, sharing, key, url, config,
           default_values, vpn_id, created_at, updated_at
    FROM templates
"#;

/// Template database operations
pub struct TemplateRepo;

impl TemplateRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<Template>> {
        let rows = sqlx::query(&format!("{} ORDER BY name LIMIT ? OFFSET ?", SELECT_TEMPLATE))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_template_row).collect())
    }

    /// Public templates, filterable by name/description substring.
    /// Both filters are AND-combined when given.
    pub async fn list_public(
        pool: &Pool<Sqlite>,
        name: Option<&str>,
        des: Option<&str>,
    ) -> Result<Vec<Template>> {
        let mut sql = format!("{} WHERE sharing = 'public'", SELECT_TEMPLATE);
        if name.is_some() {
            sql.push_str(" AND name LIKE '%' || ? || '%'");
        }
        if des.is_some() {
            sql.push_str(" AND description LIKE '%' || ? || '%'");
        }
        sql.push_str(" ORDER BY name");

        let mut query = sqlx::query(&sql);
        if let Some(name) = name {
            query = query.bind(name.to_string());
        }
        if let Some(des) = des {
            query = query.bind(des.to_string());
        }

        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(map_template_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Template>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_TEMPLATE))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_template_row))
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Template>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_TEMPLATE))
            .bind(name)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_template_row))
    }

    /// Fetch a template under the public sharing rules: public, or
    /// secret_key with a matching access key. Anything else reads as
    /// not found.
    pub async fn get_shared(
        pool: &Pool<Sqlite>,
        id: &str,
        key: Option<&str>,
    ) -> Result<Option<Template>> {
        let row = match key {
            Some(key) => {
                sqlx::query(&format!(
                    "{} WHERE id = ? AND sharing = 'secret_key' AND key = ?",
                    SELECT_TEMPLATE
                ))
                .bind(id)
                .bind(key)
                .fetch_optional(pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{} WHERE id = ? AND sharing = 'public'",
                    SELECT_TEMPLATE
                ))
                .bind(id)
                .fetch_optional(pool)
                .await?
            }
        };

        Ok(row.as_ref().map(map_template_row))
    }

    pub async fn create(
        pool: &Pool<Sqlite>,
        id: &str,
        req: &CreateTemplateRequest,
    ) -> Result<Template> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO templates (id, name, description, backend, type, sharing, key, url,
                                   config, default_values, vpn_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.backend)
        .bind(req.kind.as_deref().unwrap_or(template_kind::GENERIC))
        .bind(req.sharing.as_deref().unwrap_or(sharing::PRIVATE))
        .bind(&req.key)
        .bind(&req.url)
        .bind(encode_json(req.config.as_ref()))
        .bind(encode_json(req.default_values.as_ref()))
        .bind(&req.vpn_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, id)
            .await?
            .context("Template not found after creation")
    }

    pub async fn update(
        pool: &Pool<Sqlite>,
        id: &str,
        req: &CreateTemplateRequest,
    ) -> Result<Template> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE templates SET name = ?, description = ?, backend = ?, type = ?, sharing = ?,
                                 key = ?, url = ?, config = ?, default_values = ?, vpn_id = ?,
                                 updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.backend)
        .bind(req.kind.as_deref().unwrap_or(template_kind::GENERIC))
        .bind(req.sharing.as_deref().unwrap_or(sharing::PRIVATE))
        .bind(&req.key)
        .bind(&req.url)
        .bind(encode_json(req.config.as_ref()))
        .bind(encode_json(req.default_values.as_ref()))
        .bind(&req.vpn_id)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Template", id).into());
        }

        Self::get(pool, id)
            .await?
            .context("Template not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: &str) -> Result<()> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM config_templates WHERE template_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM template_subscriptions WHERE template_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Template", id).into());
        }
        Ok(())
    }

    /// Templates built on a VPN. A certificate rotation or host change
    /// reaches devices through these.
    pub async fn ids_using_vpn(pool: &Pool<Sqlite>, vpn_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM templates WHERE vpn_id = ?")
            .bind(vpn_id)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Devices whose config uses this template. Mutating a template
    /// invalidates every one of them.
    pub async fn device_ids_using(pool: &Pool<Sqlite>, template_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT c.device_id FROM configs c
            JOIN config_templates ct ON ct.config_id = c.id
            WHERE ct.template_id = ?
            "#,
        )
        .bind(template_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

fn encode_json(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "{}".to_string(),
    }
}
