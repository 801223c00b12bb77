use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        // Device synchronization protocol
        .route("/controller/checksum/:id", get(handlers::controller::checksum))
        .route("/controller/download-config/:id", get(handlers::controller::download_config))
        .route("/controller/report-status/:id", post(handlers::controller::report_status))
        .route("/controller/register", post(handlers::controller::register))
        // Device routes
        .route("/api/devices", get(handlers::devices::list_devices))
        .route("/api/devices", post(handlers::devices::create_device))
        .route("/api/devices/preview", post(handlers::devices::preview_config))
        .route("/api/devices/:id", get(handlers::devices::get_device))
        .route("/api/devices/:id", put(handlers::devices::update_device))
        .route("/api/devices/:id", delete(handlers::devices::delete_device))
        .route("/api/devices/:id/configuration", get(handlers::devices::download_configuration))
        // Template routes (admin)
        .route("/api/templates", get(handlers::templates::list_templates))
        .route("/api/templates", post(handlers::templates::create_template))
        .route("/api/templates/:id", get(handlers::templates::get_template))
        .route("/api/templates/:id", put(handlers::templates::update_template))
        .route("/api/templates/:id", delete(handlers::templates::delete_template))
        // Template routes (public sharing API)
        .route("/api/v1/templates", get(handlers::templates::list_public_templates))
        .route("/api/v1/templates", post(handlers::templates::create_external_template))
        .route("/api/v1/templates/subscription", post(handlers::templates::template_subscription))
        .route("/api/v1/templates/synchronize", post(handlers::templates::synchronize_template))
        .route("/api/v1/templates/:id", get(handlers::templates::public_template_detail))
        // VPN routes
        .route("/api/vpns", get(handlers::vpns::list_vpns))
        .route("/api/vpns", post(handlers::vpns::create_vpn))
        .route("/api/vpns/:id", get(handlers::vpns::get_vpn))
        .route("/api/vpns/:id", put(handlers::vpns::update_vpn))
        .route("/api/vpns/:id", delete(handlers::vpns::delete_vpn))
        // Health
        .route("/api/health", get(handlers::healthcheck))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;
    use crate::config::Config;
    use crate::db::Store;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let store = Store::with_pool_size(":memory:", 1).await.unwrap();
        let config = Config {
            db_path: ":memory:".to_string(),
            db_max_connections: 1,
            listen_addr: "127.0.0.1:0".to_string(),
            registration_enabled: true,
            shared_secret: "supersecret".to_string(),
            backends: vec!["openwrt".to_string(), "vyos".to_string()],
            base_url: "http://localhost:8080".to_string(),
        };
        let composer = Composer::new(store.clone());
        let state = Arc::new(AppState {
            store,
            config,
            composer,
        });
        build(state)
    }

    async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn send_form(app: &Router, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn get_text(app: &Router, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    async fn create_dhcp_template(app: &Router) -> String {
        let (status, body) = send_json(
            app,
            "POST",
            "/api/templates",
            json!({
                "name": "dhcp",
                "backend": "openwrt",
                "config": {"interfaces": [
                    {"name": "eth0", "type": "ethernet", "proto": "dhcp"}
                ]}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_device(app: &Router, templates: Vec<String>) -> Value {
        let (status, body) = send_json(
            app,
            "POST",
            "/api/devices",
            json!({
                "name": "node1",
                "backend": "openwrt",
                "config": {"interfaces": [{"name": "lo0", "type": "loopback"}]},
                "templates": templates
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{:?}", body);
        body
    }

    #[tokio::test]
    async fn test_end_to_end_checksum_flow() {
        let app = test_app().await;
        let template_id = create_dhcp_template(&app).await;
        let device = create_device(&app, vec![template_id]).await;
        let id = device["id"].as_str().unwrap();
        let key = device["key"].as_str().unwrap();

        let cached = device["config"]["checksum"].as_str().unwrap();
        assert!(!cached.is_empty());

        let (status, body) =
            get_text(&app, &format!("/controller/checksum/{}?key={}", id, key)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, cached);

        // stable across polls
        let (_, again) = get_text(&app, &format!("/controller/checksum/{}?key={}", id, key)).await;
        assert_eq!(again, cached);
    }

    #[tokio::test]
    async fn test_key_enforcement() {
        let app = test_app().await;
        let device = create_device(&app, Vec::new()).await;
        let id = device["id"].as_str().unwrap();

        let (status, _) = get_text(&app, &format!("/controller/checksum/{}?key=wrong", id)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = get_text(&app, &format!("/controller/checksum/{}", id)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) =
            get_text(&app, &format!("/controller/download-config/{}?key=no", id)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = get_text(&app, "/controller/checksum/unknown-device?key=x").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_returns_archive() {
        let app = test_app().await;
        let template_id = create_dhcp_template(&app).await;
        let device = create_device(&app, vec![template_id]).await;
        let id = device["id"].as_str().unwrap();
        let key = device["key"].as_str().unwrap();

        let request = Request::builder()
            .method("GET")
            .uri(format!("/controller/download-config/{}?key={}", id, key))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn test_report_status_transitions() {
        let app = test_app().await;
        let device = create_device(&app, Vec::new()).await;
        let id = device["id"].as_str().unwrap();
        let key = device["key"].as_str().unwrap();
        assert_eq!(device["config"]["status"], "modified");

        // out-of-set value is rejected and does not mutate
        let (status, _) = send_form(
            &app,
            &format!("/controller/report-status/{}", id),
            &format!("key={}&status=bogus", key),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (_, body) = get_json(&app, &format!("/api/devices/{}", id)).await;
        assert_eq!(body["config"]["status"], "modified");

        let (status, text) = send_form(
            &app,
            &format!("/controller/report-status/{}", id),
            &format!("key={}&status=applied", key),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("report-result: success"));
        assert!(text.contains("current-status: applied"));

        let (_, body) = get_json(&app, &format!("/api/devices/{}", id)).await;
        assert_eq!(body["config"]["status"], "applied");

        // applied -> error: the machine cycles, nothing is terminal
        let (status, _) = send_form(
            &app,
            &format!("/controller/report-status/{}", id),
            &format!("key={}&status=error", key),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // wrong key still rejected even with a valid status
        let (status, _) = send_form(
            &app,
            &format!("/controller/report-status/{}", id),
            "key=wrong&status=applied",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_checksum_survives_noop_recompose() {
        let app = test_app().await;
        let device = create_device(&app, Vec::new()).await;
        let id = device["id"].as_str().unwrap();
        let key = device["key"].as_str().unwrap();
        let checksum = device["config"]["checksum"].as_str().unwrap().to_string();

        let (status, _) = send_form(
            &app,
            &format!("/controller/report-status/{}", id),
            &format!("key={}&status=applied", key),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // downloading recompiles the same tree; checksum and status hold
        let _ = get_text(&app, &format!("/controller/download-config/{}?key={}", id, key)).await;
        let (_, body) = get_json(&app, &format!("/api/devices/{}", id)).await;
        assert_eq!(body["config"]["checksum"], checksum.as_str());
        assert_eq!(body["config"]["status"], "applied");
    }

    #[tokio::test]
    async fn test_register_creates_device() {
        let app = test_app().await;

        let (status, _) = send_form(
            &app,
            "/controller/register",
            "secret=wrong&name=n1&backend=openwrt",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send_form(
            &app,
            "/controller/register",
            "secret=supersecret&name=n1&backend=unknown",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send_form(
            &app,
            "/controller/register",
            "secret=supersecret&name=n1&backend=openwrt",
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.contains("registration-result: success"));

        let uuid = body
            .lines()
            .find_map(|l| l.strip_prefix("uuid: "))
            .unwrap()
            .to_string();
        let device_key = body
            .lines()
            .find_map(|l| l.strip_prefix("key: "))
            .unwrap()
            .to_string();

        let (status, checksum) = get_text(
            &app,
            &format!("/controller/checksum/{}?key={}", uuid, device_key),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!checksum.is_empty());
    }

    #[tokio::test]
    async fn test_preview_failure_kinds_are_distinct() {
        let app = test_app().await;

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/devices/preview",
            json!({"backend": "openwrt", "config": "WRONG"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "malformed-input");

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/devices/preview",
            json!({"backend": "openwrt", "templates": ["missing-id"]}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "reference-error");

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/devices/preview",
            json!({"backend": "openwrt", "config": "{\"interfaces\": {\"wrong\": \"wrong\"}}"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "validation-error");
        assert_eq!(body["path"], "interfaces");
    }

    #[tokio::test]
    async fn test_preview_renders_merged_config() {
        let app = test_app().await;
        let template_id = create_dhcp_template(&app).await;

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/devices/preview",
            json!({
                "name": "preview-device",
                "backend": "openwrt",
                "config": "{\"interfaces\": [{\"name\": \"lo0\", \"type\": \"loopback\"}]}",
                "templates": [template_id]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["checksum"].as_str().unwrap().is_empty());
        let network = body["files"]
            .as_array()
            .unwrap()
            .iter()
            .find(|f| f["name"] == "etc/config/network")
            .unwrap();
        let content = network["content"].as_str().unwrap();
        assert!(content.contains("lo0"));
        assert!(content.contains("eth0"));
        assert!(content.contains("dhcp"));
    }

    #[tokio::test]
    async fn test_duplicate_templates_rejected_naming_both() {
        let app = test_app().await;
        let make = |name: &str| {
            json!({
                "name": name,
                "backend": "openwrt",
                "config": {"general": {"hostname": "dup"}}
            })
        };
        let (_, t1) = send_json(&app, "POST", "/api/templates", make("first")).await;
        let (_, t2) = send_json(&app, "POST", "/api/templates", make("second")).await;

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/devices",
            json!({
                "name": "node1",
                "backend": "openwrt",
                "templates": [t1["id"], t2["id"]]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("first"));
        assert!(message.contains("second"));
        assert_eq!(body["sources"], json!(["first", "second"]));
    }

    #[tokio::test]
    async fn test_context_overrides_template_defaults() {
        let app = test_app().await;
        let (status, template) = send_json(
            &app,
            "POST",
            "/api/templates",
            json!({
                "name": "addressed",
                "backend": "openwrt",
                "config": {"interfaces": [{"name": "eth0", "type": "ethernet", "addresses": [
                    {"family": "ipv4", "proto": "static", "address": "{{ ip }}", "mask": 24}
                ]}]},
                "default_values": {"ip": "10.0.0.1"}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send_json(
            &app,
            "POST",
            "/api/devices",
            json!({
                "name": "node1",
                "backend": "openwrt",
                "context": {"ip": "192.168.1.1"},
                "templates": [template["id"]]
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap();
        let key = body["key"].as_str().unwrap();

        let (_, text) =
            get_text(&app, &format!("/controller/download-config/{}?key={}", id, key)).await;
        assert!(text.contains("192.168.1.1"));
        assert!(!text.contains("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_template_mutation_invalidates_checksum() {
        let app = test_app().await;
        let template_id = create_dhcp_template(&app).await;
        let device = create_device(&app, vec![template_id.clone()]).await;
        let id = device["id"].as_str().unwrap();
        let before = device["config"]["checksum"].as_str().unwrap().to_string();

        let (status, _) = send_json(
            &app,
            "PUT",
            &format!("/api/templates/{}", template_id),
            json!({
                "name": "dhcp",
                "backend": "openwrt",
                "config": {"interfaces": [
                    {"name": "eth1", "type": "ethernet", "proto": "dhcp"}
                ]}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get_json(&app, &format!("/api/devices/{}", id)).await;
        let after = body["config"]["checksum"].as_str().unwrap();
        assert_ne!(after, before);
        assert_eq!(body["config"]["status"], "modified");
    }

    #[tokio::test]
    async fn test_public_template_sharing_rules() {
        let app = test_app().await;
        let (_, public) = send_json(
            &app,
            "POST",
            "/api/templates",
            json!({"name": "pub", "backend": "openwrt", "sharing": "public",
                   "description": "public dns", "config": {"dns_servers": ["10.0.0.1"]}}),
        )
        .await;
        let (_, secret) = send_json(
            &app,
            "POST",
            "/api/templates",
            json!({"name": "sec", "backend": "openwrt", "sharing": "secret_key",
                   "key": "s3cr3t", "config": {}}),
        )
        .await;
        send_json(
            &app,
            "POST",
            "/api/templates",
            json!({"name": "priv", "backend": "openwrt", "config": {}}),
        )
        .await;

        let (status, body) = get_json(&app, "/api/v1/templates").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = get_json(&app, "/api/v1/templates?name=pub&des=dns").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let public_id = public["id"].as_str().unwrap();
        let (status, _) = get_json(&app, &format!("/api/v1/templates/{}", public_id)).await;
        assert_eq!(status, StatusCode::OK);

        let secret_id = secret["id"].as_str().unwrap();
        let (status, _) = get_json(&app, &format!("/api/v1/templates/{}", secret_id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) =
            get_json(&app, &format!("/api/v1/templates/{}?key=s3cr3t", secret_id)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_subscription_upsert_endpoint() {
        let app = test_app().await;
        let (_, template) = send_json(
            &app,
            "POST",
            "/api/templates",
            json!({"name": "shared", "backend": "openwrt", "config": {}}),
        )
        .await;
        let template_id = template["id"].as_str().unwrap();

        let (status, _) = send_form(
            &app,
            "/api/v1/templates/subscription",
            &format!(
                "template={}&subscriber=http://sub.example&subscribe=true",
                template_id
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send_form(
            &app,
            "/api/v1/templates/subscription",
            &format!(
                "template={}&subscriber=http://sub.example&subscribe=false",
                template_id
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send_form(
            &app,
            "/api/v1/templates/subscription",
            "template=missing&subscriber=http://sub.example&subscribe=true",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_backend_rejected_at_creation() {
        let app = test_app().await;
        let (status, _) = send_json(
            &app,
            "POST",
            "/api/devices",
            json!({"name": "node1", "backend": "junos"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_json(
            &app,
            "POST",
            "/api/templates",
            json!({"name": "t", "backend": "nope", "config": {}}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
