//! Server-Sent Events line decoder.
//!
//! Implements the dispatch rules from the HTML5 SSE section
//! (<https://html.spec.whatwg.org/multipage/comms.html#server-sent-events>):
//! arbitrary byte chunks go in, `(event, data)` pairs come out whenever a
//! blank line terminates an event. The decoder has no opinion about the
//! transport it's fed from: `macme-marathon` drives it from a `reqwest`
//! byte stream, but it would work just as well fed from a raw socket.

/// Default maximum line length in bytes before a connection is dropped.
pub const DEFAULT_MAX_LENGTH: usize = 16_384;

/// The result of feeding one chunk of bytes to the decoder.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SseOutcome {
    /// Events dispatched by this chunk, in order.
    pub events: Vec<(String, String)>,
    /// Set once a line longer than `MAX_LENGTH` is seen. Once set, the
    /// decoder discards the rest of the chunk and every subsequent `feed`
    /// call is a no-op; the caller is expected to close the transport.
    pub disconnect: bool,
}

/// A stream-oriented SSE decoder.
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: String,
    data_lines: Vec<String>,
    max_length: usize,
    disconnecting: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    /// Creates a decoder with the default 16KiB line-length limit.
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LENGTH)
    }

    /// Creates a decoder with a custom line-length limit.
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            event: default_event_name(),
            data_lines: Vec::new(),
            max_length,
            disconnecting: false,
        }
    }

    /// Whether the decoder has requested the transport close.
    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting
    }

    /// Feeds a chunk of bytes, returning any events dispatched by it.
    ///
    /// Once [`SseDecoder::is_disconnecting`] is true, this is a no-op.
    pub fn feed(&mut self, bytes: &[u8]) -> SseOutcome {
        let mut outcome = SseOutcome::default();
        if self.disconnecting {
            return outcome;
        }

        let mut combined = std::mem::take(&mut self.buffer);
        combined.extend_from_slice(bytes);

        let (lines, leftover) = split_lines(&combined);

        for line in lines {
            if line.len() > self.max_length {
                self.disconnect(&mut outcome);
                return outcome;
            }
            if let Some(event) = self.process_line(line) {
                outcome.events.push(event);
            }
        }

        if leftover.len() > self.max_length {
            self.disconnect(&mut outcome);
            return outcome;
        }

        self.buffer = leftover.to_vec();
        outcome
    }

    fn disconnect(&mut self, outcome: &mut SseOutcome) {
        self.disconnecting = true;
        self.buffer.clear();
        outcome.disconnect = true;
    }

    /// Processes one already length-checked line. Returns `Some` only when
    /// the line is blank and dispatch produces a non-empty-data event.
    fn process_line(&mut self, line: &[u8]) -> Option<(String, String)> {
        let line = String::from_utf8_lossy(line);

        if line.is_empty() {
            return self.dispatch();
        }

        match parse_field_value(&line) {
            Some((field, value)) => self.handle_field(field, value),
            None => {} // comment line, discarded
        }
        None
    }

    fn handle_field(&mut self, field: &str, value: &str) {
        match field {
            "event" => self.event = value.to_string(),
            "data" => self.data_lines.push(value.to_string()),
            // id and retry are accepted but ignored, per §4.1.
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<(String, String)> {
        let result = if self.data_lines.is_empty() {
            None
        } else {
            Some((self.event.clone(), self.data_lines.join("\n")))
        };
        self.event = default_event_name();
        self.data_lines.clear();
        result
    }
}

fn default_event_name() -> String {
    "message".to_string()
}

/// Parses `field: value` out of a single decoded line.
///
/// Returns `None` for a comment line (starts with `:`). A line with no `:`
/// is the whole field with an empty value.
fn parse_field_value(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(':') {
        return None;
    }
    match line.split_once(':') {
        None => Some((line, "")),
        Some((field, value)) => Some((field, value.strip_prefix(' ').unwrap_or(value))),
    }
}

/// Splits `buf` on any of `\r\n`, `\n`, `\r`, returning the complete lines
/// and the trailing unterminated remainder (possibly empty).
fn split_lines(buf: &[u8]) -> (Vec<&[u8]>, &[u8]) {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            b'\n' => {
                lines.push(&buf[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&buf[start..i]);
                if i + 1 < buf.len() && buf[i + 1] == b'\n' {
                    i += 2;
                } else {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    (lines, &buf[start..])
}
