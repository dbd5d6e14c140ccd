use std::mem;

/// Line-buffering parser for the `data:` lines of a server-sent event stream.
///
/// Network chunks do not line up with event boundaries: one chunk may carry
/// several events and one event may be split across chunks. Incomplete lines
/// stay buffered until their newline arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes and returns the payload of every completed `data:` line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);

            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Drains a trailing line that never received its newline.
    pub fn flush(&mut self) -> Vec<String> {
        let remaining = mem::take(&mut self.buffer);
        data_payload(remaining.trim_end_matches('\r'))
            .into_iter()
            .collect()
    }
}

// Blank separators, comments and `event:`/`id:`/`retry:` fields carry nothing for this protocol.
fn data_payload(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim().is_empty() {
        return None;
    }
    Some(data.to_string())
}
