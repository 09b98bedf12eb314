use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use tierwatch_core::config::UpstreamConfig;
use tierwatch_core::error::AppError;
use tierwatch_core::traits::Fetcher;

const ACCEPT_PAGES: &str = "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8";

/// HTTP fetcher using reqwest.
///
/// Downloads raw upstream pages with browser-like headers and separate
/// connect/read deadlines. Failures are classified for the retry layer:
/// timeouts and transport errors are transient, non-2xx answers are not.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::from_config(&UpstreamConfig::default())
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_PAGES));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| AppError::ConfigError(format!("Invalid Accept-Language: {e}")))?,
        );

        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            timeout_secs: config.read_timeout.as_secs(),
        })
    }

    fn classify(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else if e.is_builder() {
            AppError::UpstreamError(format!("Invalid request: {e}"))
        } else {
            AppError::NetworkError(e.to_string())
        }
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        response.text().await.map_err(|e| match self.classify(e) {
            AppError::NetworkError(msg) => {
                AppError::NetworkError(format!("Failed to read response body: {msg}"))
            }
            other => other,
        })
    }
}
