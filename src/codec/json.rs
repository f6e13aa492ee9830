//! JSON codec using `serde_json`.

use serde::de::DeserializeOwned;

/// JSON codec for bus records.
pub struct JsonCodec;

impl JsonCodec {
    /// Decode one record.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the bytes are not valid JSON for `T`.
    #[inline]
    pub fn decode<T: DeserializeOwned>(record: &[u8]) -> serde_json::Result<T> {
        serde_json::from_slice(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, PartialEq, Debug)]
    struct Sample {
        id: u32,
        text: String,
    }

    #[test]
    fn test_decode_record() {
        let decoded: Sample = JsonCodec::decode(br#"{"id":1,"text":"line one\nline two"}"#).unwrap();
        assert_eq!(
            decoded,
            Sample {
                id: 1,
                text: "line one\nline two".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_ignores_surrounding_whitespace() {
        let decoded: Sample = JsonCodec::decode(b" {\"id\":2,\"text\":\"\"}\r").unwrap();
        assert_eq!(decoded.id, 2);
    }

    #[test]
    fn test_decode_invalid() {
        let result: serde_json::Result<Sample> = JsonCodec::decode(b"{\"id\":");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_wrong_shape() {
        let result: serde_json::Result<Sample> = JsonCodec::decode(b"[1,2]");
        assert!(result.is_err());
    }
}
