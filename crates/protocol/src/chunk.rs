use serde::Deserialize;
use serde_json::Value;
use snafu::ResultExt;

use super::error::{DecodeChunkSnafu, ProtocolResult};

/// Terminator sent as the final `data:` line of a chat stream.
pub const STREAM_DONE_MARKER: &str = "[DONE]";

/// One decoded `data:` payload of the UI message stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamChunk {
    #[serde(rename_all = "camelCase")]
    Start {
        #[serde(default)]
        message_id: Option<String>,
    },
    StartStep,
    FinishStep,
    TextStart {
        #[serde(default)]
        id: Option<String>,
    },
    TextDelta {
        #[serde(default)]
        id: Option<String>,
        delta: String,
    },
    TextEnd {
        #[serde(default)]
        id: Option<String>,
    },
    ReasoningStart,
    ReasoningDelta {
        delta: String,
    },
    ReasoningEnd,
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        tool_call_id: String,
        #[serde(default)]
        output: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        error_text: String,
    },
    Finish,
    Abort,
    #[serde(other)]
    Unknown,
}

/// Raw SSE data line after framing has been stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Chunk(StreamChunk),
    Done,
}

/// Decodes the payload of one `data:` line.
pub fn decode_frame(data: &str) -> ProtocolResult<StreamFrame> {
    let trimmed = data.trim();
    if trimmed == STREAM_DONE_MARKER {
        return Ok(StreamFrame::Done);
    }

    let chunk = serde_json::from_str::<StreamChunk>(trimmed).context(DecodeChunkSnafu {
        stage: "decode-stream-chunk",
    })?;
    Ok(StreamFrame::Chunk(chunk))
}
