use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::{map_config_row, map_device_row};

const SELECT_DEVICE: &str = r#"
    SELECT id, name, mac_address, hardware_id, model, os, notes, key, last_ip,
           created_at, updated_at
    FROM devices
"#;

const SELECT_CONFIG: &str = r#"
    SELECT id, device_id, backend, config, context, status, checksum, last_ip,
           created_at, updated_at
    FROM configs
"#;

/// Device database operations
pub struct DeviceRepo;

impl DeviceRepo {
    pub async fn list(pool: &Pool<Sqlite>, limit: i32, offset: i32) -> Result<Vec<Device>> {
        let rows = sqlx::query(&format!("{} ORDER BY name LIMIT ? OFFSET ?", SELECT_DEVICE))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_device_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Device>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_DEVICE))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_device_row))
    }

    pub async fn key_exists(pool: &Pool<Sqlite>, key: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM devices WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    /// Create a device together with its owned config and template
    /// attachments in one transaction.
    pub async fn create(
        pool: &Pool<Sqlite>,
        id: &str,
        key: &str,
        req: &CreateDeviceRequest,
    ) -> Result<Device> {
        let now = Utc::now();
        let config_id = uuid::Uuid::new_v4().to_string();
        let config_json = encode_tree(req.config.as_ref());
        let context_json = encode_tree(req.context.as_ref());

        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO devices (id, name, mac_address, hardware_id, model, os, notes, key,
                                 last_ip, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, '', ?, ?)
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.mac_address)
        .bind(&req.hardware_id)
        .bind(&req.model)
        .bind(&req.os)
        .bind(&req.notes)
        .bind(key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO configs (id, device_id, backend, config, context, status, checksum,
                                 last_ip, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'modified', NULL, '', ?, ?)
            "#,
        )
        .bind(&config_id)
        .bind(id)
        .bind(&req.backend)
        .bind(&config_json)
        .bind(&context_json)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (i, template_id) in req.templates.iter().enumerate() {
            sqlx::query(
                "INSERT INTO config_templates (config_id, template_id, sort_order) VALUES (?, ?, ?)",
            )
            .bind(&config_id)
            .bind(template_id)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Self::get(pool, id)
            .await?
            .context("Device not found after creation")
    }

    pub async fn update(pool: &Pool<Sqlite>, id: &str, req: &UpdateDeviceRequest) -> Result<Device> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE devices SET name = ?, mac_address = ?, hardware_id = ?, model = ?,
                               os = ?, notes = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.name)
        .bind(&req.mac_address)
        .bind(&req.hardware_id)
        .bind(&req.model)
        .bind(&req.os)
        .bind(&req.notes)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Device", id).into());
        }

        Self::get(pool, id)
            .await?
            .context("Device not found after update")
    }

    /// Delete a device and everything it owns. The config row and its
    /// template links never outlive the device.
    pub async fn delete(pool: &Pool<Sqlite>, id: &str) -> Result<()> {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "DELETE FROM config_templates WHERE config_id IN (SELECT id FROM configs WHERE device_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM configs WHERE device_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Device", id).into());
        }
        Ok(())
    }

    pub async fn set_last_ip(pool: &Pool<Sqlite>, id: &str, ip: &str) -> Result<()> {
        sqlx::query("UPDATE devices SET last_ip = ? WHERE id = ?")
            .bind(ip)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

/// Config database operations
pub struct ConfigRepo;

impl ConfigRepo {
    pub async fn get_by_device(pool: &Pool<Sqlite>, device_id: &str) -> Result<Option<DeviceConfig>> {
        let row = sqlx::query(&format!("{} WHERE device_id = ?", SELECT_CONFIG))
            .bind(device_id)
            .fetch_optional(pool)
            .await?;

        let mut config = match row.as_ref().map(map_config_row) {
            Some(config) => config,
            None => return Ok(None),
        };
        config.templates = Self::template_ids(pool, &config.id).await?;
        Ok(Some(config))
    }

    /// Template ids attached to a config, in application order.
    pub async fn template_ids(pool: &Pool<Sqlite>, config_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT template_id FROM config_templates WHERE config_id = ? ORDER BY sort_order",
        )
        .bind(config_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Replace the backend, base tree, context and template list.
    /// Any change through here invalidates the cached checksum and
    /// resets the status to modified.
    pub async fn update_payload(
        pool: &Pool<Sqlite>,
        config_id: &str,
        backend: &str,
        config: Option<&Value>,
        context: Option<&Value>,
        templates: &[String],
    ) -> Result<()> {
        let now = Utc::now();
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            UPDATE configs SET backend = ?, config = ?, context = ?,
                               status = 'modified', checksum = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(backend)
        .bind(encode_tree(config))
        .bind(encode_tree(context))
        .bind(now)
        .bind(config_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM config_templates WHERE config_id = ?")
            .bind(config_id)
            .execute(&mut *tx)
            .await?;
        for (i, template_id) in templates.iter().enumerate() {
            sqlx::query(
                "INSERT INTO config_templates (config_id, template_id, sort_order) VALUES (?, ?, ?)",
            )
            .bind(config_id)
            .bind(template_id)
            .bind(i as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Single-statement status write; concurrent reports are
    /// last-writer-wins snapshots.
    pub async fn set_status(pool: &Pool<Sqlite>, config_id: &str, status: &str) -> Result<()> {
        let now = Utc::now();
        sqlx::query("UPDATE configs SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(config_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Store a freshly computed checksum. The row is only touched when
    /// the checksum actually changed: a no-op recompile never flips an
    /// applied config back to modified. Returns whether it changed.
    pub async fn refresh_checksum(
        pool: &Pool<Sqlite>,
        config_id: &str,
        checksum: &str,
    ) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE configs SET checksum = ?, status = 'modified', updated_at = ?
            WHERE id = ? AND (checksum IS NULL OR checksum != ?)
            "#,
        )
        .bind(checksum)
        .bind(now)
        .bind(config_id)
        .bind(checksum)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_last_ip(pool: &Pool<Sqlite>, config_id: &str, ip: &str) -> Result<()> {
        sqlx::query("UPDATE configs SET last_ip = ? WHERE id = ?")
            .bind(ip)
            .bind(config_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}

fn encode_tree(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "{}".to_string(),
    }
}
