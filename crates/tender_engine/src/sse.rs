//! Incremental `text/event-stream` decoding.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `message` when the server sent none.
    pub event: String,
    pub data: String,
}

/// Turns arbitrary byte chunks into complete frames.
///
/// Chunks may split lines and even UTF-8 sequences; only complete lines are
/// decoded. `id` and `retry` fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
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
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_survive_arbitrary_chunking() {
        let stream = b"event: status\r\ndata: {\"a\":1}\r\n\r\n: keepalive\n\nevent: region_status\ndata: x\ndata: y\n\n";
        let mut decoder = SseDecoder::new();
        let mut frames = Vec::new();
        for chunk in stream.chunks(3) {
            frames.extend(decoder.feed(chunk));
        }
        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: "status".to_string(),
                    data: "{\"a\":1}".to_string()
                },
                SseFrame {
                    event: "region_status".to_string(),
                    data: "x\ny".to_string()
                },
            ]
        );
    }

    #[test]
    fn unnamed_event_defaults_to_message() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data:plain\n\n");
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "plain");
    }

    #[test]
    fn incomplete_frame_is_held_back() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: status\ndata: 1\n").is_empty());
        assert_eq!(decoder.feed(b"\n").len(), 1);
    }
}
