//! HTTP client with connection pooling and retry logic

use dstage_config::NetworkConfig;
use dstage_errors::{Error, NetworkError};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Network client configuration
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub user_agent: String,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 16,
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            user_agent: format!("dstage/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&NetworkConfig> for NetConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout),
            retry_count: config.retries,
            retry_delay: Duration::from_secs(config.retry_delay),
            ..Self::default()
        }
    }
}

/// HTTP client wrapper with retry logic
///
/// Only transport failures are retried. A response with any status code is
/// handed back to the caller, who decides what the status means.
#[derive(Clone, Debug)]
pub struct NetClient {
    client: Client,
    config: NetConfig,
}

impl NetClient {
    /// Create a new network client
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to initialize.
    pub fn new(config: NetConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| NetworkError::ConnectionRefused(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created with default settings.
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(NetConfig::default())
    }

    /// Execute a GET request with retries
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after all retry attempts.
    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.retry_request(|| self.client.get(url)).await
    }

    /// Execute a POST request with query parameters and an empty body.
    ///
    /// Sent exactly once: a POST that timed out may still have been
    /// accepted by the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post_query(&self, url: &str, query: &[(&str, &str)]) -> Result<Response, Error> {
        match self.client.post(url).query(query).send().await {
            Ok(response) => Self::check_rate_limit(response),
            Err(e) => Err(Self::convert_error(e)),
        }
    }

    /// Execute a request with retries
    async fn retry_request<F>(&self, build: F) -> Result<Response, Error>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.retry_count {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay * attempt).await;
            }

            match build().send().await {
                Ok(response) => return Self::check_rate_limit(response),
                Err(e) => {
                    let retry = Self::should_retry(&e);
                    last_error = Some(e);

                    if !retry {
                        break;
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(Self::convert_error(e)),
            None => Err(NetworkError::RequestFailed("unknown error".to_string()).into()),
        }
    }

    fn check_rate_limit(response: Response) -> Result<Response, Error> {
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            if let Some(retry_after) = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
            {
                return Err(NetworkError::RateLimited {
                    seconds: retry_after,
                }
                .into());
            }
        }
        Ok(response)
    }

    fn convert_error(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            NetworkError::Timeout {
                url: e.url().map(ToString::to_string).unwrap_or_default(),
            }
            .into()
        } else if e.is_connect() {
            NetworkError::ConnectionRefused(e.to_string()).into()
        } else {
            NetworkError::RequestFailed(e.to_string()).into()
        }
    }

    /// Determine if an error should be retried
    fn should_retry(error: &reqwest::Error) -> bool {
        // Retry on timeout, connection errors, and server errors
        error.is_timeout()
            || error.is_connect()
            || error.status().is_none_or(|s| s.is_server_error())
    }

    /// Configuration this client was built with
    #[must_use]
    pub fn config(&self) -> &NetConfig {
        &self.config
    }
}
