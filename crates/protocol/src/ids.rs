use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, ProtocolError, ProtocolResult};

// Ids are minted by the server (or by `generate`) and treated as opaque text everywhere else.
macro_rules! define_wire_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> ProtocolResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty(),
                    InvalidIdSnafu {
                        stage: "parse-wire-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(raw: &str) -> ProtocolResult<Self> {
                Self::parse(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_wire_id!(ChatId, "chat-id");
define_wire_id!(MessageId, "message-id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_rejects_blank_ids() {
        let id = ChatId::parse("  abc123 ").expect("valid id");
        assert_eq!(id.as_str(), "abc123");
        assert!(ChatId::parse("   ").is_err());
        assert!("".parse::<MessageId>().is_err());
    }

    #[test]
    fn generated_message_ids_are_unique_and_serialize_as_plain_strings() {
        let first = MessageId::generate();
        let second = MessageId::generate();
        assert_ne!(first, second);

        let json = serde_json::to_string(&first).expect("serialize id");
        assert_eq!(json, format!("\"{first}\""));
    }
}
