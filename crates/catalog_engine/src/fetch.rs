use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

use crate::decode::decode_page;
use crate::session::{DriverFactory, PageDriver, SessionError};
use crate::{FailureKind, ItemError};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_page_bytes: u64,
    pub max_asset_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_page_bytes: 5 * 1024 * 1024,
            max_asset_bytes: 25 * 1024 * 1024,
            allowed_content_types: vec![
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
            ],
            user_agent: concat!("catalog-collector/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Plain HTTP page driver. Serves pages that render without script, and
/// downloads binary assets for every session kind.
#[derive(Debug, Clone)]
pub struct ReqwestDriver {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl ReqwestDriver {
    pub fn new(settings: FetchSettings) -> Result<Self, ItemError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|err| ItemError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Streams `url` into `sink`, returning the byte count and the declared
    /// content type. Used for gallery images.
    pub async fn download_to(
        &self,
        url: &str,
        sink: &mut (dyn Write + Send),
    ) -> Result<(u64, Option<String>), ItemError> {
        let response = self.get(url, self.settings.max_asset_bytes).await?;
        let content_type = header_content_type(&response);
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            written += chunk.len() as u64;
            if written > self.settings.max_asset_bytes {
                return Err(too_large(self.settings.max_asset_bytes, written));
            }
            sink.write_all(&chunk)?;
        }
        sink.flush()?;
        Ok((written, content_type))
    }

    async fn get(&self, url: &str, max_bytes: u64) -> Result<reqwest::Response, ItemError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| ItemError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ItemError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(too_large(max_bytes, len));
            }
        }
        Ok(response)
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or(content_type)
            .trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(essence))
    }
}

#[async_trait]
impl PageDriver for ReqwestDriver {
    async fn fetch_page_content(&self, url: &str) -> Result<String, ItemError> {
        let response = self.get(url, self.settings.max_page_bytes).await?;
        let content_type = header_content_type(&response);
        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Err(ItemError::new(
                    FailureKind::UnsupportedContentType {
                        content_type: ct.to_string(),
                    },
                    url,
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = (bytes.len() + chunk.len()) as u64;
            if next_len > self.settings.max_page_bytes {
                return Err(too_large(self.settings.max_page_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }
        decode_page(&bytes, content_type.as_deref())
    }

    async fn shutdown(&self) {}
}

/// Launches [`ReqwestDriver`]s; lets sessions run without a browser binary.
#[derive(Debug, Clone, Default)]
pub struct HttpDriverFactory {
    settings: FetchSettings,
}

impl HttpDriverFactory {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn launch(&self) -> Result<Arc<dyn PageDriver>, SessionError> {
        let driver = ReqwestDriver::new(self.settings.clone())
            .map_err(|err| SessionError::Launch(err.to_string()))?;
        Ok(Arc::new(driver))
    }
}

fn header_content_type(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn too_large(max_bytes: u64, actual: u64) -> ItemError {
    ItemError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn map_reqwest_error(err: reqwest::Error) -> ItemError {
    if err.is_timeout() {
        return ItemError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return ItemError::new(FailureKind::RedirectLimitExceeded, err.to_string());
    }
    ItemError::new(FailureKind::Network, err.to_string())
}
