//! Minimal server-sent events reader for the step transport. Only `data:`
//! fields are used; comments and other fields are skipped.
use anyhow::{Result, anyhow};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Response;

#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feeds raw bytes and returns every event completed by them. Bytes are
    /// buffered until a full line is available, so multi-byte characters
    /// split across network chunks survive.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data
                    .push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
        }
        events
    }

    /// Flushes an event left open when the connection closed.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            self.feed(b"\n");
        }
        if self.data.is_empty() {
            None
        } else {
            let event = self.data.join("\n");
            self.data.clear();
            Some(event)
        }
    }
}

/// The `data` payload of every event in the response body, in order.
pub fn data_events(response: Response) -> BoxStream<'static, Result<String>> {
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::default();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in decoder.feed(&bytes) {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    yield Err(anyhow!("Event stream error: {}", err));
                    break;
                }
            }
        }
        if let Some(event) = decoder.finish() {
            yield Ok(event);
        }
    };
    Box::pin(stream)
}
