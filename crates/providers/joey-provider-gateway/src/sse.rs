//! Server-Sent Events framing for the chat stream
//!
//! The gateway sends `data: <json>` events separated by a blank line and ends
//! with `data: [DONE]`. Network reads do not line up with frames, so bytes are
//! buffered until a full blank-line-terminated frame is available. Working on
//! bytes keeps multi-byte characters split across reads intact.

use bytes::{BufMut, BytesMut};
use serde::Deserialize;

/// Terminal marker sent as the last frame
pub const DONE_MARKER: &str = "[DONE]";

/// Incremental SSE frame decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    // bytes before this offset hold no frame boundary
    scanned: usize,
}

impl SseDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes from one network read
    pub fn push(&mut self, chunk: &[u8]) {
        // CRLF framing is folded into LF framing
        self.buffer.reserve(chunk.len());
        for &b in chunk.iter().filter(|&&b| b != b'\r') {
            self.buffer.put_u8(b);
        }
    }

    /// Data of the next complete frame, if one is buffered.
    ///
    /// Frames without any `data:` line (comments, keep-alives) are skipped.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            // a boundary may straddle the previous scan's last byte
            let from = self.scanned.saturating_sub(1);
            let Some(offset) = self.buffer[from..].windows(2).position(|w| w == b"\n\n") else {
                self.scanned = self.buffer.len();
                return None;
            };
            let end = from + offset;
            let frame = self.buffer.split_to(end + 2);
            self.scanned = 0;
            if let Some(data) = frame_data(&frame[..end]) {
                return Some(data);
            }
        }
    }

    /// Data of a trailing frame left without a terminating blank line
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.split();
        self.scanned = 0;
        frame_data(&rest)
    }

    /// Bytes buffered but not yet framed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Join the `data:` lines of one raw frame
fn frame_data(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let mut data: Option<String> = None;

    for line in text.lines() {
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        match data.as_mut() {
            Some(d) => {
                d.push('\n');
                d.push_str(rest);
            }
            None => data = Some(rest.to_string()),
        }
    }

    data
}

/// Meaning of one frame's data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Literal `[DONE]`
    Done,
    /// Non-empty text delta
    Delta(String),
    /// `finish_reason == "stop"`, possibly carrying a last delta
    Stop(Option<String>),
    /// Valid JSON without text or a terminal signal (role headers, usage)
    Ignored,
    /// Not parseable; carries the parse error
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Interpret the data of one frame
pub fn parse_frame(data: &str) -> Frame {
    let data = data.trim();
    if data == DONE_MARKER {
        return Frame::Done;
    }
    if data.is_empty() {
        return Frame::Ignored;
    }

    let chunk: ChunkFrame = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => return Frame::Malformed(e.to_string()),
    };

    let mut stop = chunk.finish_reason.as_deref() == Some("stop");
    let mut piece = None;
    if let Some(choice) = chunk.choices.into_iter().next() {
        stop |= choice.finish_reason.as_deref() == Some("stop");
        piece = choice
            .delta
            .and_then(|d| d.content)
            .filter(|c| !c.is_empty());
    }

    match (stop, piece) {
        (true, tail) => Frame::Stop(tail),
        (false, Some(p)) => Frame::Delta(p),
        (false, None) => Frame::Ignored,
    }
}
