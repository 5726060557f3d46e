//! `application/x-www-form-urlencoded` codec.
//!
//! Decoding keeps duplicate keys as repeated values. A value whose percent
//! sequence is malformed, or whose bytes are invalid in the charset, is dropped
//! with a warning; the rest of the form still decodes.
//!
//! Encoding canonicalises: spaces become `+` and reserved bytes are escaped, so
//! `encode(decode(s))` may differ from `s` while `decode(encode(decode(s)))`
//! always equals `decode(s)`.

use thiserror::Error;
use url::form_urlencoded::byte_serialize;

use crate::body::captured::Charset;

/// A single form value failed to decode or encode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormEncodingError {
    #[error("malformed percent sequence at byte {0}")]
    MalformedPercent(usize),

    #[error("decoded bytes are not valid {0}")]
    InvalidBytes(Charset),

    #[error("character {0:?} cannot be encoded as {1}")]
    Unencodable(char, Charset),
}

/// Ordered multi-valued form fields.
///
/// Keys keep first-insertion order; values keep arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormEntries {
    entries: Vec<(String, Vec<String>)>,
}

impl FormEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, keeping any existing values for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FormEntries {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut entries = FormEntries::new();
        for (k, v) in iter {
            entries.append(k, v);
        }
        entries
    }
}

/// Decode a urlencoded body.
pub fn decode(body: &str, charset: Charset) -> FormEntries {
    let mut entries = FormEntries::new();

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let decoded = decode_component(raw_key, charset)
            .and_then(|key| decode_component(raw_value, charset).map(|value| (key, value)));

        match decoded {
            Ok((key, value)) => entries.append(key, value),
            Err(e) => {
                tracing::warn!(field = %raw_key, error = %e, "Skipping undecodable form value");
            }
        }
    }

    entries
}

/// Encode entries as `key=value` pairs joined by `&`, no trailing separator.
pub fn encode(entries: &FormEntries, charset: Charset) -> String {
    let mut out = String::new();

    for (key, values) in entries.iter() {
        let key = match encode_component(key, charset) {
            Ok(k) => k,
            Err(e) => {
                tracing::warn!(field = %key, error = %e, "Skipping unencodable form field");
                continue;
            }
        };
        for value in values {
            match encode_component(value, charset) {
                Ok(value) => {
                    if !out.is_empty() {
                        out.push('&');
                    }
                    out.push_str(&key);
                    out.push('=');
                    out.push_str(&value);
                }
                Err(e) => {
                    tracing::warn!(field = %key, error = %e, "Skipping unencodable form value");
                }
            }
        }
    }

    out
}

fn decode_component(raw: &str, charset: Charset) -> Result<String, FormEncodingError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hi = bytes.get(i + 1).and_then(|b| hex_value(*b));
                let lo = bytes.get(i + 2).and_then(|b| hex_value(*b));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => return Err(FormEncodingError::MalformedPercent(i)),
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    charset
        .decode(&out)
        .ok_or(FormEncodingError::InvalidBytes(charset))
}

fn encode_component(text: &str, charset: Charset) -> Result<String, FormEncodingError> {
    let bytes = charset
        .encode(text)
        .map_err(|c| FormEncodingError::Unencodable(c, charset))?;
    Ok(byte_serialize(&bytes).collect())
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}
