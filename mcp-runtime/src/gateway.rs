//! The single choke point for talking to a Matomo instance.
//!
//! [`MatomoClient`] turns a [`RemoteQuery`] into one HTTP GET against
//! `<base_url>/index.php`, then classifies the decoded body: Matomo reports
//! logical failures as `200 OK` with `{"result": "error", "message": ...}`,
//! so those are lifted into [`ToolError::RemoteApi`] here.

use std::sync::Arc;

use async_trait::async_trait;
use matomo_core::endpoint::EndpointConfig;
use matomo_core::error::ToolError;
use matomo_core::query::{Period, RemoteQuery};
use reqwest::Url;
use serde_json::Value;

use crate::util::client;

/// Perform one GET and hand back the decoded JSON body.
///
/// Implementations must fail on connection errors, timeouts, non-2xx
/// statuses and bodies that are not JSON.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &Url, query: &[(String, String)]) -> Result<Value, ToolError>;
}

/// `reqwest`-backed transport with a bounded per-request timeout.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ToolError> {
        let http = client()
            .map_err(|e| ToolError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &Url, query: &[(String, String)]) -> Result<Value, ToolError> {
        let response = self
            .http
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| {
                // reqwest embeds the full URL (token included) in its errors.
                let e = e.without_url();
                if e.is_timeout() {
                    ToolError::Transport(format!("Request to {url} timed out: {e}"))
                } else {
                    ToolError::Transport(format!("Failed to reach Matomo at {url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Transport(format!(
                "HTTP {} from {url}",
                status.as_u16()
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            ToolError::Transport(format!(
                "Failed to read Matomo response body: {}",
                e.without_url()
            ))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ToolError::Transport(format!("Matomo response is not valid JSON: {e}")))
    }
}

#[derive(Clone)]
pub struct MatomoClient {
    endpoint: EndpointConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for MatomoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatomoClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl MatomoClient {
    pub fn new(endpoint: EndpointConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint,
            transport,
        }
    }

    /// Call any Reporting API method. The payload is returned verbatim.
    pub async fn call(&self, query: &RemoteQuery) -> Result<Value, ToolError> {
        for key in query.shadowed_reserved_keys() {
            tracing::warn!(
                method = %query.method,
                key,
                "dropping caller-supplied reserved query parameter"
            );
        }
        tracing::debug!(method = %query.method, "calling Matomo API");

        let pairs = query.to_pairs(self.endpoint.token());
        let body = self
            .transport
            .get_json(self.endpoint.api_url(), &pairs)
            .await?;
        classify_response(body)
    }

    pub async fn get_site_info(&self, site_id: i64) -> Result<Value, ToolError> {
        self.call(&RemoteQuery::new(methods::SITE_INFO).with("idSite", site_id))
            .await
    }

    pub async fn get_visits_summary(
        &self,
        site_id: i64,
        period: Period,
        date: &str,
    ) -> Result<Value, ToolError> {
        self.call(&report_query(methods::VISITS_SUMMARY, site_id, period, date))
            .await
    }

    pub async fn get_page_urls(
        &self,
        site_id: i64,
        period: Period,
        date: &str,
        limit: i64,
    ) -> Result<Value, ToolError> {
        self.call(
            &report_query(methods::PAGE_URLS, site_id, period, date).with("filter_limit", limit),
        )
        .await
    }

    pub async fn get_countries(
        &self,
        site_id: i64,
        period: Period,
        date: &str,
        limit: i64,
    ) -> Result<Value, ToolError> {
        self.call(
            &report_query(methods::COUNTRIES, site_id, period, date).with("filter_limit", limit),
        )
        .await
    }

    pub async fn get_user_settings(
        &self,
        site_id: i64,
        period: Period,
        date: &str,
    ) -> Result<Value, ToolError> {
        self.call(&report_query(methods::DEVICE_TYPES, site_id, period, date))
            .await
    }

    pub async fn get_browsers(
        &self,
        site_id: i64,
        period: Period,
        date: &str,
    ) -> Result<Value, ToolError> {
        self.call(&report_query(methods::BROWSERS, site_id, period, date))
            .await
    }

    pub async fn get_referrers(
        &self,
        site_id: i64,
        period: Period,
        date: &str,
        limit: i64,
    ) -> Result<Value, ToolError> {
        self.call(
            &report_query(methods::REFERRERS, site_id, period, date).with("filter_limit", limit),
        )
        .await
    }
}

/// Remote method names behind the curated reports.
pub mod methods {
    pub const SITE_INFO: &str = "SitesManager.getSiteFromId";
    pub const VISITS_SUMMARY: &str = "VisitsSummary.get";
    pub const PAGE_URLS: &str = "Actions.getPageUrls";
    pub const COUNTRIES: &str = "UserCountry.getCountry";
    pub const DEVICE_TYPES: &str = "DevicesDetection.getType";
    pub const BROWSERS: &str = "DevicesDetection.getBrowsers";
    pub const REFERRERS: &str = "Referrers.getAll";
}

/// `{idSite, period, date}`, the shape shared by every periodic report.
pub fn report_query(method: &str, site_id: i64, period: Period, date: &str) -> RemoteQuery {
    RemoteQuery::new(method)
        .with("idSite", site_id)
        .with("period", period)
        .with("date", date)
}

fn classify_response(body: Value) -> Result<Value, ToolError> {
    let is_error = body
        .as_object()
        .and_then(|obj| obj.get("result"))
        .and_then(Value::as_str)
        .is_some_and(|result| result == "error");
    if !is_error {
        return Ok(body);
    }
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();
    Err(ToolError::RemoteApi(message))
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn call_sends_reserved_keys_and_params_to_index_php() {
        let transport = RecordingTransport::replying(json!({"idsite": "1", "name": "Test Site"}));
        let client = MatomoClient::new(test_endpoint(), transport.clone());

        let result = client.get_site_info(1).await.unwrap();
        assert_eq!(result, json!({"idsite": "1", "name": "Test Site"}));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url, "https://matomo.example.com/index.php");
        assert_eq!(request.param("module"), Some("API"));
        assert_eq!(request.param("method"), Some("SitesManager.getSiteFromId"));
        assert_eq!(request.param("format"), Some("JSON"));
        assert_eq!(request.param("token_auth"), Some("test_token_123"));
        assert_eq!(request.report_params(), vec![("idSite", "1")]);
    }

    #[tokio::test]
    async fn limited_reports_send_filter_limit() {
        let transport = RecordingTransport::replying(json!([]));
        let client = MatomoClient::new(test_endpoint(), transport.clone());

        client
            .get_referrers(4, Period::Week, "last7", 25)
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.param("method"), Some("Referrers.getAll"));
        assert_eq!(
            request.report_params(),
            vec![
                ("idSite", "4"),
                ("period", "week"),
                ("date", "last7"),
                ("filter_limit", "25"),
            ]
        );
    }

    #[tokio::test]
    async fn remote_error_is_classified_with_message() {
        let transport = RecordingTransport::replying(json!({
            "result": "error",
            "message": "Invalid authentication token"
        }));
        let client = MatomoClient::new(test_endpoint(), transport);

        let err = client
            .call(&RemoteQuery::new("SitesManager.getSiteFromId").with("idSite", 1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::RemoteApi("Invalid authentication token".to_string())
        );
        assert!(err.to_string().starts_with("Matomo API error"));
    }

    #[tokio::test]
    async fn remote_error_without_message_uses_placeholder() {
        let transport = RecordingTransport::replying(json!({"result": "error"}));
        let client = MatomoClient::new(test_endpoint(), transport);

        let err = client
            .get_visits_summary(1, Period::Day, "today")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Matomo API error: Unknown error");
    }

    #[tokio::test]
    async fn success_result_field_is_not_an_error() {
        let body = json!({"result": "success", "message": "ok"});
        let transport = RecordingTransport::replying(body.clone());
        let client = MatomoClient::new(test_endpoint(), transport);

        let result = client.call(&RemoteQuery::new("API.getMatomoVersion")).await;
        assert_eq!(result, Ok(body));
    }

    #[tokio::test]
    async fn transport_errors_propagate_unchanged() {
        let transport =
            RecordingTransport::failing(ToolError::Transport("HTTP 503 from x".to_string()));
        let client = MatomoClient::new(test_endpoint(), transport);

        let err = client
            .get_browsers(1, Period::Day, "today")
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Transport("HTTP 503 from x".to_string()));
    }

    #[tokio::test]
    async fn caller_cannot_override_reserved_keys() {
        let transport = RecordingTransport::replying(json!({}));
        let client = MatomoClient::new(test_endpoint(), transport.clone());

        let query = RemoteQuery::new("Goals.get")
            .with("idSite", 2)
            .with("token_auth", "other")
            .with("format", "XML");
        client.call(&query).await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.param("token_auth"), Some("test_token_123"));
        assert_eq!(request.param("format"), Some("JSON"));
        assert_eq!(request.report_params(), vec![("idSite", "2")]);
    }

    #[tokio::test]
    async fn http_transport_reports_unreachable_host() {
        let transport = HttpTransport::new().unwrap();
        let url = Url::parse("http://127.0.0.1:9/index.php").unwrap();
        let err = transport
            .get_json(&url, &[("token_auth".to_string(), "secret".to_string())])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "transport_error");
        assert!(!err.to_string().contains("secret"));
    }

    /// Answer the first connection on a local port with `response`.
    async fn serve_once(response: &'static str) -> Url {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0_u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        Url::parse(&format!("http://{addr}/index.php")).unwrap()
    }

    fn secret_query() -> Vec<(String, String)> {
        vec![("token_auth".to_string(), "secret_token".to_string())]
    }

    #[tokio::test]
    async fn http_transport_rejects_error_status() {
        let url = serve_once(
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let err = HttpTransport::new()
            .unwrap()
            .get_json(&url, &secret_query())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "transport_error");
        assert!(err.to_string().starts_with("HTTP 500"), "{err}");
        assert!(!err.to_string().contains("secret_token"));
    }

    #[tokio::test]
    async fn http_transport_rejects_non_json_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 15\r\nConnection: close\r\n\r\n<html>hi</html>",
        )
        .await;
        let err = HttpTransport::new()
            .unwrap()
            .get_json(&url, &secret_query())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "transport_error");
        assert!(err.to_string().contains("not valid JSON"), "{err}");
        assert!(!err.to_string().contains("secret_token"));
    }

    #[tokio::test]
    async fn http_transport_decodes_json_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 16\r\nConnection: close\r\n\r\n{\"nb_visits\":42}",
        )
        .await;
        let body = HttpTransport::new()
            .unwrap()
            .get_json(&url, &secret_query())
            .await
            .unwrap();
        assert_eq!(body, json!({"nb_visits": 42}));
    }
}
