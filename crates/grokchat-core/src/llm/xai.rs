use crate::constants::endpoints;
use crate::constants::env;
use crate::constants::models::ModelInfo;
use crate::error::{ChatError, Result};
use crate::llm::traits::*;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

/// Client for the xAI chat completions endpoint (OpenAI-compatible wire format).
pub struct XaiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl XaiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: endpoints::XAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    /// Client configured for one catalogue model. `GROKCHAT_BASE_URL`
    /// replaces the default endpoint host when set.
    pub fn for_model(api_key: impl Into<String>, model: &ModelInfo) -> Self {
        let client = Self::new(api_key).with_timeout(Duration::from_secs(model.timeout_secs));
        match std::env::var(env::BASE_URL) {
            Ok(url) if !url.trim().is_empty() => client.with_base_url(url.trim()),
            _ => client,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Upper bound for a non-streamed request, body included. A streamed
    /// request is bounded up to the response headers only.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            endpoints::CHAT_COMPLETIONS_PATH
        )
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let mut body = request.clone();
        body.stream = stream;

        tracing::info!(
            model = %body.model,
            messages = body.messages.len(),
            stream,
            "Sending completion request"
        );

        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body);
        if !stream {
            builder = builder.timeout(self.timeout);
        }

        let timed_out = || {
            ChatError::Remote(format!("request timed out after {:?}", self.timeout))
        };
        let sent = if stream {
            tokio::time::timeout(self.timeout, builder.send())
                .await
                .map_err(|_| timed_out())?
        } else {
            builder.send().await
        };
        let response = sent.map_err(|e| {
            if e.is_timeout() {
                timed_out()
            } else {
                ChatError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), "Completion request rejected");
        Err(match status.as_u16() {
            401 => ChatError::Remote("invalid API key (401)".into()),
            403 => ChatError::Remote("API access forbidden (403)".into()),
            429 => ChatError::Remote(format!("rate limit reached (429): {text}")),
            _ => ChatError::Remote(format!("API error ({status}): {text}")),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait::async_trait]
impl CompletionClient for XaiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let response = self.send(request, false).await?;
        let response_text = response.text().await?;

        let api_response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| ChatError::Remote(format!("Failed to parse response: {e}")))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ChatError::Remote("No response content received".into()))?;

        let usage = api_response.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        if let Some(u) = usage {
            tracing::info!(input = u.input_tokens, output = u.output_tokens, "Completion finished");
        }

        Ok(CompletionResponse { content, usage })
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let response = self.send(request, true).await?;
        Ok(sse_events(response.bytes_stream()))
    }
}

/// Incremental decoder for `text/event-stream` completion chunks.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network chunks survive intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the end marker has been seen. Later input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a network chunk, returning the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if self.finished {
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            self.decode_line(line.trim(), &mut events)?;
        }

        Ok(events)
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::new();
        if !self.finished && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest);
            self.decode_line(line.trim(), &mut events)?;
        }
        Ok(events)
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) -> Result<()> {
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.finished = true;
            events.push(StreamEvent::Done);
            return Ok(());
        }

        let event: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Invalid JSON in stream: {e}");
                return Ok(());
            }
        };

        if let Some(error) = event.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(ChatError::Remote(message));
        }

        if let Some(choice) = event
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
        {
            if let Some(content) = choice
                .get("delta")
                .and_then(|d| d.get("content"))
                .and_then(|c| c.as_str())
            {
                if !content.is_empty() {
                    events.push(StreamEvent::TextDelta(content.to_string()));
                }
            }

            if choice.get("finish_reason").and_then(|r| r.as_str()) == Some("stop") {
                self.finished = true;
                events.push(StreamEvent::Done);
            }
        }

        Ok(())
    }
}

struct SseState<B, E> {
    bytes: BoxStream<'static, std::result::Result<B, E>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamEvent>>,
    closed: bool,
}

/// Turn a byte stream of server-sent events into a lazy [`FragmentStream`].
///
/// The stream ends right after `Done`. If the connection closes first, the
/// last item is a remote error so callers never mistake a cut-off answer for
/// a complete one.
pub fn sse_events<S, B, E>(bytes: S) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let state = SseState {
        bytes: bytes.boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        closed: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.closed || state.decoder.is_finished() {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => match state.decoder.feed(chunk.as_ref()) {
                    Ok(events) => state.pending.extend(events.into_iter().map(Ok)),
                    Err(e) => {
                        state.closed = true;
                        state.pending.push_back(Err(e));
                    }
                },
                Some(Err(e)) => {
                    state.closed = true;
                    state.pending.push_back(Err(e.into()));
                }
                None => {
                    state.closed = true;
                    match state.decoder.finish() {
                        Ok(events) => state.pending.extend(events.into_iter().map(Ok)),
                        Err(e) => state.pending.push_back(Err(e)),
                    }
                    if !state.decoder.is_finished() {
                        state.pending.push_back(Err(ChatError::Remote(
                            "stream closed before end marker".into(),
                        )));
                    }
                }
            }
        }
    })
    .boxed()
}
