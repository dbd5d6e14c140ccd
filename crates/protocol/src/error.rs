use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProtocolError {
    #[snafu(display("{id_type} '{raw}' is not a valid identifier"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
    },
    #[snafu(display("failed to decode stream chunk on `{stage}`: {source}"))]
    DecodeChunk {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to encode save payload on `{stage}`: {source}"))]
    EncodePayload {
        stage: &'static str,
        source: serde_json::Error,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
