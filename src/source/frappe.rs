use super::{InvoiceQuery, InvoiceSource, SourceError};
use crate::config::SourceConfig;
use crate::models::Invoice;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::time::Duration;

const GET_LIST_PATH: &str = "/api/method/frappe.client.get_list";

#[derive(Debug, Deserialize)]
struct GetListResponse {
    #[serde(default)]
    message: Option<Vec<Invoice>>,
}

/// 通过 `frappe.client.get_list` 查询发票
pub struct FrappeInvoiceSource {
    client: reqwest::Client,
    endpoint: String,
}

impl FrappeInvoiceSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let (Some(key), Some(secret)) = (&config.api_key, &config.api_secret) {
            let token = HeaderValue::from_str(&format!("token {}:{}", key, secret))
                .map_err(|e| SourceError::Transport(format!("invalid api credentials: {}", e)))?;
            headers.insert(AUTHORIZATION, token);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.frappe_url.trim_end_matches('/'), GET_LIST_PATH),
        })
    }
}

#[async_trait]
impl InvoiceSource for FrappeInvoiceSource {
    async fn get_list(&self, query: &InvoiceQuery) -> Result<Vec<Invoice>, SourceError> {
        let response = self.client.post(&self.endpoint).json(query).send().await?;

        let status = response.status();
        tracing::debug!("get_list {} -> {}", query.doctype, status);
        if !status.is_success() {
            return Err(SourceError::Http { status: status.as_u16() });
        }

        let body: GetListResponse = response.json().await?;
        Ok(body.message.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::OrderBy;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn source_at(url: String) -> FrappeInvoiceSource {
        let config = SourceConfig {
            frappe_url: url,
            timeout_secs: 5,
            ..SourceConfig::default()
        };
        FrappeInvoiceSource::new(&config).unwrap()
    }

    fn query() -> InvoiceQuery {
        InvoiceQuery::sales_invoices(Vec::new(), OrderBy::desc("posting_date"), 10)
    }

    /// 对第一个连接返回固定的 HTTP 响应
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    #[test]
    fn empty_message_decodes_to_no_invoices() {
        let body: GetListResponse = serde_json::from_str(r#"{"message": []}"#).unwrap();
        assert!(body.message.unwrap().is_empty());
        let body: GetListResponse = serde_json::from_str("{}").unwrap();
        assert!(body.message.is_none());
    }

    #[test]
    fn builds_endpoint_without_double_slash() {
        let config = SourceConfig {
            frappe_url: "https://erp.example.com/".to_string(),
            api_key: Some("k".to_string()),
            api_secret: Some("s".to_string()),
            ..SourceConfig::default()
        };
        let source = FrappeInvoiceSource::new(&config).unwrap();
        assert_eq!(
            source.endpoint,
            "https://erp.example.com/api/method/frappe.client.get_list"
        );
    }

    #[tokio::test]
    async fn non_success_status_is_http_error() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let err = source_at(url)
            .get_list(&query())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Http { status: 503 }));
        assert_eq!(err.to_string(), "HTTP error! status: 503");
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = source_at(format!("http://{}", addr))
            .get_list(&query())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Transport(_)));
    }
}
