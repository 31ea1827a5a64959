//! Boundary transform between [`Value`]s and the scalars backends store.
//!
//! Managed encoding embeds a structural tag in front of a bincode payload, so
//! telling an encoded scalar from a raw one never depends on how the payload
//! happens to look:
//!
//! - [`Form::Binary`]: 4-byte magic `F5 55 4B 01`. `0xF5` never starts valid
//!   UTF-8, so no raw text scalar can carry the tag.
//! - [`Form::Text`]: the ASCII tag `~ukv1:` followed by standard base64.
//!
//! Native (strict) mode bypasses the tag: strings and bytes are stored as-is
//! and read back as the form's native kind.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bincode::config::standard;

use crate::config::{CodecConfig, Form, Mode};
use crate::errors::{DecodeError, EncodeError, UnikvResult};
use crate::value::Value;

pub const BINARY_TAG: [u8; 4] = [0xF5, b'U', b'K', 0x01];
pub const TEXT_TAG: &str = "~ukv1:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    config: CodecConfig,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Serialize `value` into a tagged scalar of this codec's form.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let payload = bincode::encode_to_vec(value, standard())?;
        Ok(match self.config.form {
            Form::Binary => {
                let mut out = Vec::with_capacity(BINARY_TAG.len() + payload.len());
                out.extend_from_slice(&BINARY_TAG);
                out.extend_from_slice(&payload);
                out
            }
            Form::Text => format!("{TEXT_TAG}{}", STANDARD.encode(&payload)).into_bytes(),
        })
    }

    /// Inverse of [`Codec::encode`]. Fails on scalars this codec did not tag.
    pub fn decode(&self, raw: &[u8]) -> Result<Value, DecodeError> {
        let payload = match self.config.form {
            Form::Binary => raw
                .strip_prefix(BINARY_TAG.as_slice())
                .ok_or(DecodeError::Untagged)?
                .to_vec(),
            Form::Text => {
                let body = raw
                    .strip_prefix(TEXT_TAG.as_bytes())
                    .ok_or(DecodeError::Untagged)?;
                STANDARD.decode(body)?
            }
        };
        let (value, read) = bincode::decode_from_slice::<Value, _>(&payload, standard())?;
        if read != payload.len() {
            return Err(DecodeError::TrailingBytes(payload.len() - read));
        }
        Ok(value)
    }

    /// Whether `raw` carries this codec's structural tag.
    pub fn is_encoded(&self, raw: &[u8]) -> bool {
        match self.config.form {
            Form::Binary => raw.starts_with(&BINARY_TAG),
            Form::Text => raw.starts_with(TEXT_TAG.as_bytes()),
        }
    }

    pub fn encode_key(&self, key: &Value) -> UnikvResult<Vec<u8>> {
        self.encode_with(self.config.key_mode, key)
    }

    pub fn decode_key(&self, raw: &[u8]) -> UnikvResult<Value> {
        self.decode_with(self.config.key_mode, raw)
    }

    pub fn encode_value(&self, value: &Value) -> UnikvResult<Vec<u8>> {
        self.encode_with(self.config.value_mode, value)
    }

    pub fn decode_value(&self, raw: &[u8]) -> UnikvResult<Value> {
        self.decode_with(self.config.value_mode, raw)
    }

    /// Whether key bytes are plain UTF-8 text, which is what makes a literal
    /// key pattern usable as a backend prefix scan.
    pub fn keys_are_native_text(&self) -> bool {
        self.config.key_mode == Mode::Native && self.config.form == Form::Text
    }

    fn encode_with(&self, mode: Mode, value: &Value) -> UnikvResult<Vec<u8>> {
        match mode {
            Mode::Managed => Ok(self.encode(value)?),
            Mode::Native => match value {
                Value::Str(s) => Ok(s.as_bytes().to_vec()),
                Value::Bytes(b) => Ok(b.clone()),
                other => Err(EncodeError::NotNative(other.kind()).into()),
            },
        }
    }

    fn decode_with(&self, mode: Mode, raw: &[u8]) -> UnikvResult<Value> {
        match mode {
            Mode::Managed if self.is_encoded(raw) => Ok(self.decode(raw)?),
            Mode::Managed if !self.config.accept_raw => Err(DecodeError::Untagged.into()),
            _ => self.decode_native(raw),
        }
    }

    fn decode_native(&self, raw: &[u8]) -> UnikvResult<Value> {
        match self.config.form {
            Form::Binary => Ok(Value::Bytes(raw.to_vec())),
            Form::Text => Ok(Value::Str(
                String::from_utf8(raw.to_vec()).map_err(DecodeError::from)?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UnikvError;
    use crate::value::ValueKind;

    fn text_codec() -> Codec {
        Codec::new(CodecConfig::builder().form(Form::Text).build())
    }

    fn sample() -> Value {
        Value::record([
            ("name", Value::from("alice")),
            ("tags", Value::list(["a", "b"])),
            ("score", Value::from(9.5)),
            ("blob", Value::from(vec![0u8, 255])),
            ("none", Value::Null),
        ])
    }

    #[test]
    fn binary_round_trip() {
        let codec = Codec::default();
        let raw = codec.encode(&sample()).unwrap();
        assert!(raw.starts_with(&BINARY_TAG));
        assert_eq!(codec.decode(&raw).unwrap(), sample());
    }

    #[test]
    fn text_form_is_printable() {
        let codec = text_codec();
        let raw = codec.encode(&sample()).unwrap();
        let text = String::from_utf8(raw.clone()).unwrap();
        assert!(text.starts_with(TEXT_TAG));
        assert!(text.is_ascii());
        assert_eq!(codec.decode(&raw).unwrap(), sample());
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = Codec::default();
        assert_eq!(codec.encode(&sample()).unwrap(), codec.encode(&sample()).unwrap());
    }

    #[test]
    fn decode_rejects_untagged_scalars() {
        let codec = Codec::default();
        assert!(matches!(codec.decode(b"plain"), Err(DecodeError::Untagged)));
        // Looks like a pickled blob, still not ours.
        assert!(matches!(codec.decode(b"b'\\x80"), Err(DecodeError::Untagged)));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let codec = Codec::default();
        let mut raw = codec.encode(&Value::from(7)).unwrap();
        raw.push(0);
        assert!(matches!(codec.decode(&raw), Err(DecodeError::TrailingBytes(1))));
    }

    #[test]
    fn decode_rejects_bad_base64() {
        let codec = text_codec();
        let raw = format!("{TEXT_TAG}!!not base64!!");
        assert!(matches!(codec.decode(raw.as_bytes()), Err(DecodeError::Base64(_))));
    }

    #[test]
    fn managed_mode_passes_raw_scalars_through() {
        let codec = Codec::default();
        assert_eq!(codec.decode_value(b"legacy").unwrap(), Value::from(b"legacy".as_slice()));

        let codec = text_codec();
        assert_eq!(codec.decode_value(b"legacy").unwrap(), Value::from("legacy"));
    }

    #[test]
    fn managed_mode_can_refuse_raw_scalars() {
        let codec = Codec::new(CodecConfig::builder().accept_raw(false).build());
        assert!(matches!(
            codec.decode_value(b"legacy"),
            Err(UnikvError::Decode(DecodeError::Untagged))
        ));
    }

    #[test]
    fn native_mode_stores_strings_and_bytes_as_is() {
        let codec = Codec::new(CodecConfig::strict_text());
        assert_eq!(codec.encode_key(&Value::from("k")).unwrap(), b"k".to_vec());
        assert_eq!(codec.decode_key(b"k").unwrap(), Value::from("k"));

        let codec = Codec::new(CodecConfig::strict());
        assert_eq!(codec.encode_value(&Value::from(vec![1u8, 2])).unwrap(), vec![1, 2]);
        assert_eq!(codec.decode_value(&[1, 2]).unwrap(), Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn native_mode_rejects_structured_values() {
        let codec = Codec::new(CodecConfig::strict());
        let err = codec.encode_value(&Value::list([1, 2])).unwrap_err();
        assert!(matches!(
            err,
            UnikvError::Encode(EncodeError::NotNative(ValueKind::List))
        ));
    }

    #[test]
    fn native_text_rejects_invalid_utf8() {
        let codec = Codec::new(CodecConfig::strict_text());
        assert!(matches!(
            codec.decode_value(&[0xff, 0xfe]),
            Err(UnikvError::Decode(DecodeError::Utf8(_)))
        ));
    }

    #[test]
    fn key_and_value_modes_are_independent() {
        let codec = Codec::new(
            CodecConfig::builder()
                .key_mode(Mode::Native)
                .form(Form::Text)
                .build(),
        );
        assert_eq!(codec.encode_key(&Value::from("k")).unwrap(), b"k".to_vec());
        assert!(codec.is_encoded(&codec.encode_value(&Value::from(1)).unwrap()));
        assert!(codec.keys_are_native_text());
    }
}
