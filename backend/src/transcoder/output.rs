//! Transcoder diagnostic output: line framing, redaction and severity.

use regex::Regex;
use std::collections::VecDeque;
use std::io;
use std::sync::LazyLock;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Number of recent lines kept for the failure message.
pub const MAX_RECENT_LINES: usize = 25;

/// Longest line accepted before it is force-split.
const MAX_LINE_LENGTH: usize = 64 * 1024;

static CREDENTIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//(\S+):(\S+)@").expect("credentials pattern"));

const REDACTED: &str = "//<redacted>@";

/// Markers the transcoder prints once frames are flowing.
const PROGRESS_MARKERS: &[&str] = &["Press [q] to stop", "frame="];

/// Replace `user:pass@` in URIs with a fixed marker.
pub fn redact(line: &str) -> String {
    CREDENTIALS.replace_all(line, REDACTED).into_owned()
}

/// Severity of one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Other,
}

impl Severity {
    /// Classify by the `[level]` prefix the transcoder prints with `-loglevel level+...`.
    pub fn of(line: &str) -> Self {
        if line.contains("[error]") || line.contains("[fatal]") || line.contains("[panic]") {
            Self::Error
        } else if line.contains("[warning]") {
            Self::Warning
        } else {
            Self::Other
        }
    }
}

pub fn is_progress(line: &str) -> bool {
    PROGRESS_MARKERS.iter().any(|m| line.contains(m))
}

/// Splits a byte stream into lines on `\n`, `\r` or `\r\n`, dropping blank lines.
#[derive(Debug, Default)]
pub struct OutputLineCodec;

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let end = match src.iter().position(|b| *b == b'\n' || *b == b'\r') {
                Some(pos) => pos,
                None if src.len() > MAX_LINE_LENGTH => MAX_LINE_LENGTH,
                None => return Ok(None),
            };

            let line = src.split_to(end);
            // Consume the terminator, if any.
            if !src.is_empty() && (src[0] == b'\n' || src[0] == b'\r') {
                src.advance(1);
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(text.to_string()));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        let text = String::from_utf8_lossy(&rest).trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }
}

/// Bounded buffer of the most recent notable lines.
#[derive(Debug, Default, Clone)]
pub struct RecentLines {
    lines: VecDeque<String>,
}

impl RecentLines {
    pub fn push(&mut self, line: String) {
        if self.lines.len() == MAX_RECENT_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn joined(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}
