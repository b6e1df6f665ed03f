use tracing::debug;

use super::config::WireFormat;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Keep-alive frames some gateways interleave with the data stream.
    fn is_ping(&self) -> bool {
        self.event.as_deref() == Some("ping")
    }
}

/// Line-oriented `text/event-stream` parser.
///
/// Fields accumulate until a blank line dispatches them as one frame; a
/// trailing `\r` on any line is ignored.
#[derive(Default)]
pub(crate) struct SseDecoder {
    partial_line: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.partial_line.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];
            let line = std::mem::take(&mut self.partial_line);
            frames.extend(self.accept_line(&line));
        }
        self.partial_line.extend_from_slice(rest);
        frames
    }

    /// Dispatches whatever is pending once the body ends without a blank line.
    pub fn flush(&mut self) -> Option<SseFrame> {
        let line = std::mem::take(&mut self.partial_line);
        self.accept_line(&line).or_else(|| self.dispatch())
    }

    fn accept_line(&mut self, raw: &[u8]) -> Option<SseFrame> {
        let text = String::from_utf8_lossy(raw);
        let line = text.strip_suffix('\r').unwrap_or(text.as_ref());
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Newline-delimited JSON splitter (Ollama `/api/chat`).
#[derive(Default)]
pub(crate) struct JsonLinesDecoder {
    buf: Vec<u8>,
}

impl JsonLinesDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            push_line(&mut lines, &line);
        }
        lines
    }

    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let mut lines = Vec::new();
        push_line(&mut lines, &rest);
        lines.pop()
    }
}

fn push_line(lines: &mut Vec<String>, bytes: &[u8]) {
    let line = String::from_utf8_lossy(bytes);
    let line = line.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
}

/// Turns response body bytes into raw JSON chunks for the adapters.
pub(crate) enum ChunkDecoder {
    Sse(SseDecoder),
    JsonLines(JsonLinesDecoder),
}

impl ChunkDecoder {
    pub fn for_format(format: WireFormat) -> Self {
        match format {
            WireFormat::ChatCompletions => Self::Sse(SseDecoder::default()),
            WireFormat::OllamaChat => Self::JsonLines(JsonLinesDecoder::default()),
        }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        match self {
            Self::Sse(decoder) => decoder
                .push_chunk(chunk)
                .iter()
                .filter_map(frame_payload)
                .collect(),
            Self::JsonLines(decoder) => decoder
                .push_chunk(chunk)
                .iter()
                .filter_map(|line| parse_payload(line))
                .collect(),
        }
    }

    pub fn flush(&mut self) -> Option<serde_json::Value> {
        match self {
            Self::Sse(decoder) => decoder.flush().as_ref().and_then(frame_payload),
            Self::JsonLines(decoder) => decoder.flush().and_then(|line| parse_payload(&line)),
        }
    }
}

fn frame_payload(frame: &SseFrame) -> Option<serde_json::Value> {
    if frame.is_ping() {
        return None;
    }
    parse_payload(&frame.data)
}

/// Decodes one frame body; the `[DONE]` sentinel and undecodable frames yield nothing.
fn parse_payload(data: &str) -> Option<serde_json::Value> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    match serde_json::from_str(data) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(error = %err, "skipping undecodable stream frame");
            None
        }
    }
}
