// src/services/transport.rs

//! HTTP transport for the report page and mug shot images.

use std::time::Duration;

use reqwest::{Client, Proxy};

use crate::error::{AppError, Result};
use crate::models::Config;

/// HTTP client shared by report and image fetches.
///
/// All requests carry the configured User-Agent and are routed through
/// the forward proxy when one is configured. Timeouts are applied per
/// request because the report page and a single image have separate
/// budgets.
pub struct Transport {
    client: Client,
    report_url: String,
    report_timeout: Duration,
    mug_shot_timeout: Duration,
}

impl Transport {
    /// Create a configured transport.
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = Client::builder().user_agent(&config.user_agent);
        if let Some(proxy) = &config.proxy {
            let proxy_url = format!("http://{}:{}", proxy.host, proxy.port);
            log::info!("Routing requests through proxy {proxy_url}");
            let proxy = Proxy::all(&proxy_url)
                .map_err(|e| AppError::config(format!("invalid proxy {proxy_url}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            report_url: config.report_url.clone(),
            report_timeout: Duration::from_secs(config.timeout.open_jail_report),
            mug_shot_timeout: Duration::from_secs(config.timeout.open_one_mug_shot),
        })
    }

    /// Fetch the report page as text.
    pub async fn fetch_report_page(&self) -> Result<String> {
        self.fetch(&self.report_url, self.report_timeout).await
    }

    /// Fetch a single image.
    pub async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        self.fetch_binary(url, self.mug_shot_timeout).await
    }

    /// Fetch a URL as text within the given timeout.
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<String> {
        let response = self.get(url, timeout).await?;
        response.text().await.map_err(|e| request_error(url, e))
    }

    /// Fetch a URL as raw bytes within the given timeout.
    pub async fn fetch_binary(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self.get(url, timeout).await?;
        let bytes = response.bytes().await.map_err(|e| request_error(url, e))?;
        Ok(bytes.to_vec())
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response> {
        self.client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| request_error(url, e))?
            .error_for_status()
            .map_err(|e| request_error(url, e))
    }
}

/// Map a request failure onto the watcher's error taxonomy.
fn request_error(url: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        AppError::timeout(format!("fetching {url}"))
    } else {
        AppError::transport(format!("fetching {url}"), error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyConfig;

    #[test]
    fn test_new_with_default_config() {
        assert!(Transport::new(&Config::default()).is_ok());
    }

    #[test]
    fn test_new_with_proxy_config() {
        let mut config = Config::default();
        config.proxy = Some(ProxyConfig {
            host: "127.0.0.1".to_string(),
            port: 8123,
        });
        assert!(Transport::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_image_unreachable_is_transport_error() {
        let mut config = Config::default();
        config.timeout.open_one_mug_shot = 1;
        let transport = Transport::new(&config).unwrap();
        let result = transport.fetch_image("http://127.0.0.1:9/none.jpg").await;
        match result {
            Err(AppError::Transport { .. }) | Err(AppError::Timeout { .. }) => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
    }
}
