mod devices;
pub(crate) mod row_helpers;
mod subscriptions;
mod templates;
mod vpns;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::models::*;

/// Typed error for "resource not found" — enables reliable downcast
/// in the API error handler instead of fragile string matching.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
}

impl Store {
    /// Create a new database store with the default pool size
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_pool_size(db_path, 5).await
    }

    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = if db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", db_path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // === Devices ===

    pub async fn list_devices(&self, limit: i32, offset: i32) -> Result<Vec<Device>> {
        devices::DeviceRepo::list(&self.pool, limit, offset).await
    }

    pub async fn get_device(&self, id: &str) -> Result<Option<Device>> {
        devices::DeviceRepo::get(&self.pool, id).await
    }

    pub async fn device_key_exists(&self, key: &str) -> Result<bool> {
        devices::DeviceRepo::key_exists(&self.pool, key).await
    }

    pub async fn create_device(
        &self,
        id: &str,
        key: &str,
        req: &CreateDeviceRequest,
    ) -> Result<Device> {
        devices::DeviceRepo::create(&self.pool, id, key, req).await
    }

    pub async fn update_device(&self, id: &str, req: &UpdateDeviceRequest) -> Result<Device> {
        devices::DeviceRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_device(&self, id: &str) -> Result<()> {
        devices::DeviceRepo::delete(&self.pool, id).await
    }

    pub async fn set_device_last_ip(&self, id: &str, ip: &str) -> Result<()> {
        devices::DeviceRepo::set_last_ip(&self.pool, id, ip).await
    }

    // === Configs ===

    pub async fn get_config_for_device(&self, device_id: &str) -> Result<Option<DeviceConfig>> {
        devices::ConfigRepo::get_by_device(&self.pool, device_id).await
    }

    pub async fn update_config_payload(
        &self,
        config_id: &str,
        backend: &str,
        config: Option<&serde_json::Value>,
        context: Option<&serde_json::Value>,
        templates: &[String],
    ) -> Result<()> {
        devices::ConfigRepo::update_payload(&self.pool, config_id, backend, config, context, templates)
            .await
    }

    pub async fn set_config_status(&self, config_id: &str, status: &str) -> Result<()> {
        devices::ConfigRepo::set_status(&self.pool, config_id, status).await
    }

    pub async fn refresh_config_checksum(&self, config_id: &str, checksum: &str) -> Result<bool> {
        devices::ConfigRepo::refresh_checksum(&self.pool, config_id, checksum).await
    }

    pub async fn set_config_last_ip(&self, config_id: &str, ip: &str) -> Result<()> {
        devices::ConfigRepo::set_last_ip(&self.pool, config_id, ip).await
    }

    // === Templates ===

    pub async fn list_templates(&self, limit: i32, offset: i32) -> Result<Vec<Template>> {
        templates::TemplateRepo::list(&self.pool, limit, offset).await
    }

    pub async fn list_public_templates(
        &self,
        name: Option<&str>,
        des: Option<&str>,
    ) -> Result<Vec<Template>> {
        templates::TemplateRepo::list_public(&self.pool, name, des).await
    }

    pub async fn get_template(&self, id: &str) -> Result<Option<Template>> {
        templates::TemplateRepo::get(&self.pool, id).await
    }

    pub async fn get_template_by_name(&self, name: &str) -> Result<Option<Template>> {
        templates::TemplateRepo::get_by_name(&self.pool, name).await
    }

    pub async fn get_shared_template(
        &self,
        id: &str,
        key: Option<&str>,
    ) -> Result<Option<Template>> {
        templates::TemplateRepo::get_shared(&self.pool, id, key).await
    }

    pub async fn create_template(&self, id: &str, req: &CreateTemplateRequest) -> Result<Template> {
        templates::TemplateRepo::create(&self.pool, id, req).await
    }

    pub async fn update_template(&self, id: &str, req: &CreateTemplateRequest) -> Result<Template> {
        templates::TemplateRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_template(&self, id: &str) -> Result<()> {
        templates::TemplateRepo::delete(&self.pool, id).await
    }

    pub async fn device_ids_using_template(&self, template_id: &str) -> Result<Vec<String>> {
        templates::TemplateRepo::device_ids_using(&self.pool, template_id).await
    }

    pub async fn template_ids_using_vpn(&self, vpn_id: &str) -> Result<Vec<String>> {
        templates::TemplateRepo::ids_using_vpn(&self.pool, vpn_id).await
    }

    // === Vpns ===

    pub async fn list_vpns(&self) -> Result<Vec<Vpn>> {
        vpns::VpnRepo::list(&self.pool).await
    }

    pub async fn get_vpn(&self, id: &str) -> Result<Option<Vpn>> {
        vpns::VpnRepo::get(&self.pool, id).await
    }

    pub async fn get_vpn_by_name(&self, name: &str) -> Result<Option<Vpn>> {
        vpns::VpnRepo::get_by_name(&self.pool, name).await
    }

    pub async fn create_vpn(&self, id: &str, req: &CreateVpnRequest) -> Result<Vpn> {
        vpns::VpnRepo::create(&self.pool, id, req).await
    }

    pub async fn update_vpn(&self, id: &str, req: &CreateVpnRequest) -> Result<Vpn> {
        vpns::VpnRepo::update(&self.pool, id, req).await
    }

    pub async fn delete_vpn(&self, id: &str) -> Result<()> {
        vpns::VpnRepo::delete(&self.pool, id).await
    }

    // === Template subscriptions ===

    pub async fn upsert_subscription(
        &self,
        template_id: &str,
        subscriber: &str,
        subscribe: bool,
    ) -> Result<()> {
        subscriptions::SubscriptionRepo::upsert(&self.pool, template_id, subscriber, subscribe).await
    }

    pub async fn get_subscription(
        &self,
        template_id: &str,
        subscriber: &str,
    ) -> Result<Option<TemplateSubscription>> {
        subscriptions::SubscriptionRepo::get(&self.pool, template_id, subscriber).await
    }

    pub async fn list_subscribers(&self, template_id: &str) -> Result<Vec<TemplateSubscription>> {
        subscriptions::SubscriptionRepo::list_subscribed(&self.pool, template_id).await
    }
}

#[cfg(test)]
pub(crate) async fn test_store() -> Store {
    Store::with_pool_size(":memory:", 1)
        .await
        .expect("in-memory store")
}
