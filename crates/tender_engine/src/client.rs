use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tender_logging::{tender_debug, tender_warn};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{ApiError, AttemptId, EngineEvent, FailureKind, SearchPayload, SearchResponse, StatusSnapshot};

/// Raw bytes of the progress channel as they arrive.
pub type EventStream = BoxStream<'static, Result<Bytes, ApiError>>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub connect_timeout: Duration,
    /// Applies to status, cancel and results calls; never to the search itself.
    pub request_timeout: Duration,
    /// Waits before each immediate resubmit after a 500/502/503.
    pub submit_retry_delays: Vec<Duration>,
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
    pub progress_tick: Duration,
    pub countdown_tick: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/".to_string(),
            bearer_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            submit_retry_delays: vec![Duration::from_secs(3), Duration::from_secs(8)],
            reconnect_delay: Duration::from_secs(2),
            poll_interval: Duration::from_secs(3),
            progress_tick: Duration::from_millis(500),
            countdown_tick: Duration::from_secs(1),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// The search service as seen by the engine.
#[async_trait::async_trait]
pub trait SearchApi: Send + Sync {
    /// One `POST /search`, without retries.
    async fn submit(&self, payload: &SearchPayload) -> Result<SearchResponse, ApiError>;

    async fn cancel(&self, search_id: &str) -> Result<(), ApiError>;

    async fn status(&self, search_id: &str) -> Result<StatusSnapshot, ApiError>;

    async fn live_results(&self, search_id: &str) -> Result<SearchResponse, ApiError>;

    /// Opens `GET /search/{id}/events`; fails on connect errors and non-2xx.
    async fn open_events(&self, search_id: &str) -> Result<EventStream, ApiError>;
}

/// Submits and resubmits on 500/502/503 after each configured delay.
///
/// Returns `FailureKind::Cancelled` as soon as `cancel` fires.
pub async fn submit_with_retries(
    api: &dyn SearchApi,
    attempt: AttemptId,
    payload: &SearchPayload,
    delays: &[Duration],
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<SearchResponse, ApiError> {
    let mut retries = delays.iter();
    let mut retry = 0u32;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            result = api.submit(payload) => result,
        };
        let err = match result {
            Ok(response) => return Ok(response),
            Err(err) => err,
        };
        if !is_immediately_retryable(&err) {
            return Err(err);
        }
        let Some(delay) = retries.next().copied() else {
            return Err(err);
        };
        retry += 1;
        tender_warn!(
            "search {} got {}; retry {} in {:?}",
            payload.search_id,
            err,
            retry,
            delay
        );
        sink.emit(EngineEvent::SubmitRetrying {
            attempt,
            retry,
            delay,
        });
        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn is_immediately_retryable(err: &ApiError) -> bool {
    matches!(err.kind, FailureKind::HttpStatus(500 | 502 | 503))
}

pub(crate) fn cancelled() -> ApiError {
    ApiError::new(FailureKind::Cancelled, "request cancelled")
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "detail")]
    message: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ReqwestSearchApi {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
    request_timeout: Duration,
}

impl ReqwestSearchApi {
    pub fn new(settings: &EngineSettings) -> Result<Self, ApiError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|err| ApiError::new(FailureKind::Network, format!("invalid base url: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::new(
                FailureKind::Network,
                format!("invalid base url: {}", settings.base_url),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            bearer_token: settings.bearer_token.clone(),
            request_timeout: settings.request_timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        tender_debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.bearer_token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let response = builder.send().await.map_err(map_reqwest_error)?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(error_from_response(response).await)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = self.send(builder).await?;
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&body).map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))
    }
}

#[async_trait::async_trait]
impl SearchApi for ReqwestSearchApi {
    async fn submit(&self, payload: &SearchPayload) -> Result<SearchResponse, ApiError> {
        let builder = self.request(Method::POST, &["search"]).json(payload);
        self.send_json(builder).await
    }

    async fn cancel(&self, search_id: &str) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, &["search", search_id, "cancel"])
            .timeout(self.request_timeout);
        self.send(builder).await.map(|_| ())
    }

    async fn status(&self, search_id: &str) -> Result<StatusSnapshot, ApiError> {
        let builder = self
            .request(Method::GET, &["search", search_id, "status"])
            .timeout(self.request_timeout);
        self.send_json(builder).await
    }

    async fn live_results(&self, search_id: &str) -> Result<SearchResponse, ApiError> {
        let builder = self
            .request(Method::GET, &["search", search_id, "results"])
            .timeout(self.request_timeout);
        self.send_json(builder).await
    }

    async fn open_events(&self, search_id: &str) -> Result<EventStream, ApiError> {
        let builder = self
            .request(Method::GET, &["search", search_id, "events"])
            .header(ACCEPT, "text/event-stream");
        let response = self.send(builder).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }
}

async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    ApiError {
        kind: FailureKind::HttpStatus(status.as_u16()),
        message,
        error_code: parsed.error_code,
        data: parsed.data,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ApiError::new(FailureKind::Decode, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
