use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;

use super::row_helpers::map_vpn_row;

const SELECT_VPN: &str = r#"
    SELECT id, name, host, backend, ca, cert, config, created_at, updated_at
    FROM vpns
"#;

/// Vpn database operations
pub struct VpnRepo;

impl VpnRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Vpn>> {
        let rows = sqlx::query(&format!("{} ORDER BY name", SELECT_VPN))
            .fetch_all(pool)
            .await?;

        Ok(rows.iter().map(map_vpn_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Vpn>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_VPN))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_vpn_row))
    }

    pub async fn get_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Vpn>> {
        let row = sqlx::query(&format!("{} WHERE name = ?", SELECT_VPN))
            .bind(name)
            .fetch_optional(pool)
            .await?;

        Ok(row.as_ref().map(map_vpn_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, id: &str, req: &CreateVpnRequest) -> Result<Vpn> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO vpns (id, name, host, backend, ca, cert, config, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&req.name)
        .bind(&req.host)
        .bind(&req.backend)
        .bind(serde_json::to_string(&req.ca)?)
        .bind(serde_json::to_string(&req.cert)?)
        .bind(encode_json(req.config.as_ref()))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, id)
            .await?
            .context("Vpn not found after creation")
    }

    pub async fn update(pool: &Pool<Sqlite>, id: &str, req: &CreateVpnRequest) -> Result<Vpn> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE vpns SET name = ?, host = ?, backend = ?, ca = ?, cert = ?, config = ?,
                            updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&req.name)
        .bind(&req.host)
        .bind(&req.backend)
        .bind(serde_json::to_string(&req.ca)?)
        .bind(serde_json::to_string(&req.cert)?)
        .bind(encode_json(req.config.as_ref()))
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Vpn", id).into());
        }

        Self::get(pool, id)
            .await?
            .context("Vpn not found after update")
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM vpns WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Vpn", id).into());
        }
        Ok(())
    }
}

fn encode_json(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "{}".to_string(),
    }
}
