//! Reversible field transform applied to designated entity columns.
//!
//! A transformed column holds, at rest, `base64(xor(plaintext, key))` with
//! the `=` padding stripped. The key is repeated across the plaintext in
//! `key.len()`-sized chunks. This is obfuscation, not encryption: anyone
//! holding one plaintext/token pair can recover the key.

use std::collections::BTreeSet;

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// Standard alphabet, no padding on encode, padding optional on decode.
const ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Transform key must not be empty")]
    #[diagnostic(
        code(stratum_db::transform::empty_key),
        help("Set a non-empty transform key on the entity or in [transform.keys]")
    )]
    EmptyKey,

    #[error("Stored value is not valid base64: {0}")]
    #[diagnostic(
        code(stratum_db::transform::invalid_token),
        help("The column may have been written without the transform, or with another key")
    )]
    InvalidToken(#[from] base64::DecodeError),

    #[error("Decoded value is not valid UTF-8")]
    #[diagnostic(
        code(stratum_db::transform::invalid_utf8),
        help("The column was probably encoded with a different key")
    )]
    InvalidUtf8,
}

fn xor(bytes: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return bytes.to_vec();
    }
    bytes
        .chunks(key.len())
        .flat_map(|chunk| chunk.iter().zip(key).map(|(b, k)| b ^ k))
        .collect()
}

/// Encodes `plaintext` with `key`.
///
/// ```rust
/// use stratum_db::transform::{decode, encode};
///
/// let token = encode("123-45-6789", "k1");
/// assert!(!token.contains('='));
/// assert_eq!(decode(&token, "k1").unwrap(), "123-45-6789");
/// ```
pub fn encode(plaintext: &str, key: &str) -> String {
    ENGINE.encode(xor(plaintext.as_bytes(), key.as_bytes()))
}

/// Reverses [`encode`]. Accepts tokens with or without `=` padding.
pub fn decode(token: &str, key: &str) -> Result<String, TransformError> {
    let bytes = ENGINE.decode(token)?;
    String::from_utf8(xor(&bytes, key.as_bytes())).map_err(|_| TransformError::InvalidUtf8)
}

/// Per-entity transform configuration: which columns, with which key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTransform {
    enabled: bool,
    columns: BTreeSet<String>,
    key: String,
}

impl FieldTransform {
    /// A transform that leaves every column alone.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new<I, S>(columns: I, key: impl Into<String>) -> Result<Self, TransformError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(TransformError::EmptyKey);
        }
        Ok(Self {
            enabled: true,
            columns: columns.into_iter().map(Into::into).collect(),
            key,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Whether assignments to `column` are encoded.
    pub fn applies_to(&self, column: &str) -> bool {
        self.enabled && self.columns.contains(column)
    }

    /// Encodes a logical value for storage. `null` is stored as `null`.
    pub fn encode_value(&self, value: &Value) -> Value {
        match value {
            Value::Null => Value::Null,
            other => Value::String(encode(&plaintext_of(other), &self.key)),
        }
    }

    /// Decodes a stored value. Non-string values are returned unchanged.
    pub fn decode_value(&self, value: &Value) -> Result<Value, TransformError> {
        match value {
            Value::String(token) => Ok(Value::String(decode(token, &self.key)?)),
            other => Ok(other.clone()),
        }
    }
}

/// The text that gets encoded for a non-null value.
fn plaintext_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_known_token() {
        // 'a' ^ 'k' = 0x0a, 'b' ^ '1' = 0x53
        assert_eq!(encode("ab", "k1"), "ClM");
        assert_eq!(decode("ClM", "k1").unwrap(), "ab");
    }

    #[test]
    fn test_roundtrip_multibyte() {
        let key = "clé-secrète";
        for text in ["", "plain ascii", "日本語テキスト", "emoji 🎉 mixed ñ", "x"] {
            let token = encode(text, key);
            assert!(!token.contains('='));
            assert_eq!(decode(&token, key).unwrap(), text);
        }
    }

    #[test]
    fn test_decode_accepts_padding() {
        let token = encode("abcd", "k");
        assert_eq!(token.len() % 4, 2);
        let padded = format!("{token}==");
        assert_eq!(decode(&padded, "k").unwrap(), "abcd");
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode("not base64!", "k"),
            Err(TransformError::InvalidToken(_))
        ));
        // 0xff alone is never valid UTF-8
        let token = ENGINE.encode(xor(&[0xff], b"k"));
        assert_eq!(decode(&token, "k"), Err(TransformError::InvalidUtf8));
    }

    #[test]
    fn test_empty_key_rejected() {
        assert_eq!(
            FieldTransform::new(["ssn"], ""),
            Err(TransformError::EmptyKey)
        );
    }

    #[test]
    fn test_field_transform_values() {
        let transform = FieldTransform::new(["ssn"], "k1").unwrap();
        assert!(transform.applies_to("ssn"));
        assert!(!transform.applies_to("name"));
        assert!(!FieldTransform::disabled().applies_to("ssn"));

        assert_eq!(transform.encode_value(&json!(null)), json!(null));
        let stored = transform.encode_value(&json!(12345));
        assert_eq!(transform.decode_value(&stored).unwrap(), json!("12345"));
        assert_eq!(transform.decode_value(&json!(7)).unwrap(), json!(7));
    }
}
