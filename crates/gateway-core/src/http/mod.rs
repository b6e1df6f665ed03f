//! Streaming HTTP chat client for OpenAI-compatible and Ollama endpoints.
mod body;
mod config;
mod framing;

use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use crate::client::{ChatModel, ChatRequest, RawChunkStream};
use crate::errors::GatewayError;
use crate::model::ProviderKind;

pub use config::{HttpClientConfig, WireFormat};

use body::build_request_body;
use framing::ChunkDecoder;

type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static>>;

/// [`ChatModel`] that posts a streaming chat request over HTTP.
pub struct HttpChatModel {
    client: reqwest::Client,
    config: HttpClientConfig,
}

impl HttpChatModel {
    pub fn new(config: HttpClientConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Provider kind this client should be registered under.
    pub fn provider(&self) -> ProviderKind {
        self.config.provider
    }
}

#[async_trait::async_trait]
impl ChatModel for HttpChatModel {
    async fn stream_chat(&self, request: ChatRequest) -> Result<RawChunkStream, GatewayError> {
        let provider = self.config.provider;
        let body = build_request_body(&request, self.config.wire_format);
        debug!(
            turn_id = %request.turn_id,
            provider = %provider,
            model = %request.model,
            iteration = request.iteration,
            "starting streaming chat request"
        );

        let mut http_req = self.client.post(self.config.endpoint_url()).json(&body);
        if let Some(key) = &self.config.api_key {
            http_req = match &self.config.api_key_header {
                Some(header) => http_req.header(header.as_str(), key.as_str()),
                None => http_req.bearer_auth(key),
            };
        }

        let response = http_req
            .send()
            .await
            .map_err(|e| GatewayError::transport(provider, format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::provider(
                provider,
                format!("chat request failed with status {status}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let bytes_stream: ByteStream = Box::pin(response.bytes_stream());
        Ok(Box::pin(chunk_stream(
            provider,
            bytes_stream,
            ChunkDecoder::for_format(self.config.wire_format),
        )))
    }
}

fn chunk_stream(
    provider: ProviderKind,
    bytes_stream: ByteStream,
    decoder: ChunkDecoder,
) -> impl futures::Stream<Item = Result<serde_json::Value, GatewayError>> + Send {
    struct State {
        provider: ProviderKind,
        bytes_stream: ByteStream,
        decoder: ChunkDecoder,
        pending: VecDeque<serde_json::Value>,
        done: bool,
    }

    stream::try_unfold(
        State {
            provider,
            bytes_stream,
            decoder,
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(chunk) = state.pending.pop_front() {
                    return Ok(Some((chunk, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes_stream.next().await {
                    Some(Ok(bytes)) => {
                        state.pending.extend(state.decoder.push_chunk(&bytes));
                    }
                    Some(Err(e)) => {
                        return Err(GatewayError::transport(
                            state.provider,
                            format!("streaming read failed: {e}"),
                        ));
                    }
                    None => {
                        state.pending.extend(state.decoder.flush());
                        state.done = true;
                    }
                }
            }
        },
    )
}
