// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the plugin-management API.
//!
//! [`HttpPluginBackend`] implements [`PluginBackend`] over the `/plugins`
//! endpoints, attaching the optional bearer token and turning non-2xx
//! responses into [`WaypointError::Backend`] with the server's detail text.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use waypoint_config::model::BackendConfig;
use waypoint_core::{
    DiscoveredPlugin, PluginBackend, PluginInfo, PluginInstallResponse, PluginSummary,
    SettingsUpdateResult, ToggleResult, UninstallResult, WaypointError,
};

/// `{ "plugins": [...] }` envelope used by the list endpoints.
#[derive(Debug, Deserialize)]
struct PluginList<T> {
    plugins: Vec<T>,
}

/// Error body shapes the backend is known to send.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Plugin backend reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPluginBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpPluginBackend {
    /// Creates a client from the `[backend]` configuration section.
    pub fn new(config: &BackendConfig) -> Result<Self, WaypointError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                WaypointError::Config(format!("invalid backend.auth_token header value: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| WaypointError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        let base_url = Url::parse(&config.base_url).map_err(|e| {
            WaypointError::Config(format!("invalid backend.base_url '{}': {e}", config.base_url))
        })?;

        Ok(Self { client, base_url })
    }

    /// Resolves `segments` below the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, WaypointError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                WaypointError::Config(format!(
                    "backend.base_url '{}' cannot be used as a base",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, WaypointError> {
        Ok(self.client.request(method, self.endpoint(segments)?))
    }

    /// Sends `request` and decodes a JSON body, mapping failures to backend errors.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        action: &str,
    ) -> Result<T, WaypointError> {
        let response = request.send().await.map_err(|e| WaypointError::Backend {
            message: format!("{action}: request failed: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        debug!(status = %status, action, "backend response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = extract_detail(&body);
            warn!(status = %status, action, detail = %detail, "backend rejected request");
            return Err(WaypointError::Backend {
                message: format!("{action}: backend returned {status}: {detail}"),
                status: Some(status.as_u16()),
                source: None,
            });
        }

        let body = response.bytes().await.map_err(|e| WaypointError::Backend {
            message: format!("{action}: failed to read response body: {e}"),
            status: Some(status.as_u16()),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_slice(&body).map_err(|e| WaypointError::Backend {
            message: format!("{action}: unexpected response body: {e}"),
            status: Some(status.as_u16()),
            source: Some(Box::new(e)),
        })
    }
}

/// Pulls a human-readable message out of an error body, falling back to the raw text.
fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
            ..
        }) => detail,
        Ok(ErrorBody {
            detail: Some(detail),
            ..
        }) => detail.to_string(),
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ if body.trim().is_empty() => "no response body".to_string(),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl PluginBackend for HttpPluginBackend {
    async fn list_plugins(&self) -> Result<Vec<PluginSummary>, WaypointError> {
        let request = self.request(Method::GET, &["plugins"])?;
        let list: PluginList<PluginSummary> = self.send(request, "list plugins").await?;
        Ok(list.plugins)
    }

    async fn list_discovered(&self) -> Result<Vec<DiscoveredPlugin>, WaypointError> {
        let request = self.request(Method::GET, &["plugins", "discovered"])?;
        let list: PluginList<DiscoveredPlugin> =
            self.send(request, "list discovered plugins").await?;
        Ok(list.plugins)
    }

    async fn get_plugin(&self, plugin_id: &str) -> Result<PluginInfo, WaypointError> {
        let request = self.request(Method::GET, &["plugins", plugin_id])?;
        self.send(request, &format!("get plugin '{plugin_id}'")).await
    }

    async fn install_discovered(
        &self,
        plugin_id: &str,
    ) -> Result<PluginInstallResponse, WaypointError> {
        let request =
            self.request(Method::POST, &["plugins", "discovered", plugin_id, "install"])?;
        self.send(request, &format!("install discovered plugin '{plugin_id}'"))
            .await
    }

    async fn install_package(
        &self,
        file_name: &str,
        package: Vec<u8>,
    ) -> Result<PluginInstallResponse, WaypointError> {
        let part = reqwest::multipart::Part::bytes(package)
            .file_name(file_name.to_string())
            .mime_str("application/zip")
            .map_err(|e| WaypointError::Internal(format!("invalid package mime type: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let request = self
            .request(Method::POST, &["plugins", "install"])?
            .multipart(form);
        self.send(request, &format!("install package '{file_name}'"))
            .await
    }

    async fn uninstall(
        &self,
        plugin_id: &str,
        drop_tables: bool,
        remove_permissions: bool,
    ) -> Result<UninstallResult, WaypointError> {
        let request = self
            .request(Method::DELETE, &["plugins", plugin_id])?
            .query(&[
                ("drop_tables", drop_tables),
                ("remove_permissions", remove_permissions),
            ]);
        self.send(request, &format!("uninstall plugin '{plugin_id}'"))
            .await
    }

    async fn enable(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError> {
        let request = self.request(Method::POST, &["plugins", plugin_id, "enable"])?;
        self.send(request, &format!("enable plugin '{plugin_id}'")).await
    }

    async fn disable(&self, plugin_id: &str) -> Result<ToggleResult, WaypointError> {
        let request = self.request(Method::POST, &["plugins", plugin_id, "disable"])?;
        self.send(request, &format!("disable plugin '{plugin_id}'")).await
    }

    async fn update_settings(
        &self,
        plugin_id: &str,
        settings: serde_json::Value,
    ) -> Result<SettingsUpdateResult, WaypointError> {
        let request = self
            .request(Method::PUT, &["plugins", plugin_id, "settings"])?
            .json(&serde_json::json!({ "settings": settings }));
        self.send(request, &format!("update settings for '{plugin_id}'"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer, token: Option<&str>) -> HttpPluginBackend {
        let config = BackendConfig {
            base_url: format!("{}/api", server.uri()),
            request_timeout_secs: 5,
            auth_token: token.map(str::to_string),
        };
        HttpPluginBackend::new(&config).unwrap()
    }

    fn summary_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "pluginId": id,
            "pluginVersion": "1.0.0",
            "manifest": {"id": id, "name": id, "version": "1.0.0"},
            "hasFrontend": true,
            "hasBackend": true,
            "enabled": true,
            "installedAt": "2026-03-01T10:00:00Z"
        })
    }

    #[tokio::test]
    async fn list_plugins_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/plugins"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "plugins": [summary_json("mileage"), summary_json("per-diem")]
            })))
            .mount(&server)
            .await;

        let plugins = backend_for(&server, None).list_plugins().await.unwrap();
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].plugin_id, "mileage");
        assert!(plugins[0].installed_at.is_some());
    }

    #[tokio::test]
    async fn bearer_token_is_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/plugins/discovered"))
            .and(header("authorization", "Bearer s3cret"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"plugins": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let discovered = backend_for(&server, Some("s3cret"))
            .list_discovered()
            .await
            .unwrap();
        assert!(discovered.is_empty());
    }

    #[tokio::test]
    async fn error_detail_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/plugins/mileage/enable"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(serde_json::json!({"detail": "plugin already enabled"})),
            )
            .mount(&server)
            .await;

        let err = backend_for(&server, None)
            .enable("mileage")
            .await
            .unwrap_err();
        match err {
            WaypointError::Backend {
                message, status, ..
            } => {
                assert_eq!(status, Some(409));
                assert!(message.contains("plugin already enabled"), "got: {message}");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn uninstall_sends_flags_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/plugins/mileage"))
            .and(query_param("drop_tables", "true"))
            .and(query_param("remove_permissions", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "pluginId": "mileage",
                "tablesDropped": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = backend_for(&server, None)
            .uninstall("mileage", true, false)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.tables_dropped);
        assert!(!result.permissions_removed);
    }

    #[tokio::test]
    async fn install_package_posts_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/plugins/install"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "pluginId": "mileage",
                "pluginVersion": "1.1.0"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = backend_for(&server, None)
            .install_package("mileage-1.1.0.zip", b"PK\x03\x04".to_vec())
            .await
            .unwrap();
        assert_eq!(response.plugin_version.as_deref(), Some("1.1.0"));

        let requests = server.received_requests().await.unwrap();
        let content_type = requests[0]
            .headers
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/form-data"));
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("mileage-1.1.0.zip"));
    }

    #[tokio::test]
    async fn update_settings_wraps_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/plugins/mileage/settings"))
            .and(body_json(serde_json::json!({"settings": {"rate": 0.42}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "settings": {"rate": 0.42}
            })))
            .mount(&server)
            .await;

        let result = backend_for(&server, None)
            .update_settings("mileage", serde_json::json!({"rate": 0.42}))
            .await
            .unwrap();
        assert_eq!(result.settings["rate"], 0.42);
    }

    #[tokio::test]
    async fn unreachable_backend_is_transport_error() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:9/api".into(),
            request_timeout_secs: 2,
            auth_token: None,
        };
        let err = HttpPluginBackend::new(&config)
            .unwrap()
            .list_plugins()
            .await
            .unwrap_err();
        assert!(matches!(err, WaypointError::Backend { status: None, .. }));
    }

    #[test]
    fn endpoint_encodes_segments_and_tolerates_trailing_slash() {
        let config = BackendConfig {
            base_url: "http://localhost:8000/api/".into(),
            ..BackendConfig::default()
        };
        let backend = HttpPluginBackend::new(&config).unwrap();
        let url = backend.endpoint(&["plugins", "odd id"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/plugins/odd%20id");
    }

    #[test]
    fn extract_detail_falls_back_to_body() {
        assert_eq!(extract_detail(r#"{"message":"nope"}"#), "nope");
        assert_eq!(extract_detail("bad gateway"), "bad gateway");
        assert_eq!(extract_detail(""), "no response body");
    }
}
