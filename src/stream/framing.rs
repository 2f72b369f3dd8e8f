//! Newline-delimited framing

use std::collections::VecDeque;
use std::fmt;

/// One complete message, without its delimiter
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for RawFrame {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawFrame({:?})", self.to_string_lossy())
    }
}

/// Accumulates bytes and splits them on `\n`.
///
/// Bytes after the last delimiter stay buffered for the next read. A line
/// longer than `max_frame_bytes` is dropped whole: once the limit is hit,
/// everything up to and including its `\n` is discarded.
#[derive(Debug)]
pub struct LineFramer {
    partial: Vec<u8>,
    ready: VecDeque<RawFrame>,
    max_frame_bytes: usize,
    /// Inside an oversized line, waiting for its delimiter
    discarding: bool,
}

impl LineFramer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            partial: Vec::new(),
            ready: VecDeque::new(),
            max_frame_bytes,
            discarding: false,
        }
    }

    /// Append freshly read bytes. Returns the number of bytes discarded
    /// because they belong to a line over the frame limit.
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let mut dropped = 0;

        for chunk in bytes.split_inclusive(|&b| b == b'\n') {
            let complete = chunk.last() == Some(&b'\n');

            if self.discarding {
                dropped += chunk.len();
                self.discarding = !complete;
                continue;
            }

            let body = if complete {
                &chunk[..chunk.len() - 1]
            } else {
                chunk
            };
            self.partial.extend_from_slice(body);

            if self.partial.len() > self.max_frame_bytes {
                dropped += self.partial.len() + usize::from(complete);
                self.partial.clear();
                self.discarding = !complete;
                continue;
            }

            if complete {
                let mut line = std::mem::take(&mut self.partial);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if !line.is_empty() {
                    self.ready.push_back(RawFrame(line));
                }
            }
        }

        dropped
    }

    /// Pop the next complete frame. Blank lines never become frames.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        self.ready.pop_front()
    }

    /// Bytes of the current line still waiting for a delimiter
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Whether the rest of an oversized line is being skipped
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }
}
