//! Wire formats for encrypted values.
//!
//! String payloads are wrapped in a tagged JSON envelope:
//!
//! ```text
//! { "v": "xchacha20-poly1305", "n": "<base64 nonce>", "c": "<base64 ciphertext>" }
//! ```
//!
//! Raw byte payloads use the untagged [`BytesEnvelope`] pair.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::{error::VaultError, xchacha20};

/// Tagged JSON envelope around one encrypted string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Cipher identifier.
    pub v: String,
    /// Nonce, standard base64.
    pub n: String,
    /// Ciphertext including tag, standard base64.
    pub c: String,
}

impl Envelope {
    /// Structural check: `input` is a JSON object with a known `v` and
    /// non-empty `n` and `c` strings. Does not decrypt.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim_start();
        if !trimmed.starts_with('{') {
            return None;
        }
        let envelope: Self = serde_json::from_str(trimmed).ok()?;
        (envelope.v == xchacha20::ALGORITHM && !envelope.n.is_empty() && !envelope.c.is_empty())
            .then_some(envelope)
    }

    pub fn to_json(&self) -> Result<String, VaultError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Whether `input` already has envelope shape.
pub fn is_envelope(input: &str) -> bool {
    Envelope::parse(input).is_some()
}

/// Nonce and ciphertext for a raw byte payload, both standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytesEnvelope {
    pub nonce: String,
    pub cipher: String,
}

/// Anything the façade can encrypt into an envelope.
#[derive(Debug, Clone)]
pub enum Plaintext<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
    /// Serialized with `serde_json` before encryption.
    Json(&'a serde_json::Value),
}

impl<'a> Plaintext<'a> {
    pub fn to_bytes(&self) -> Result<Cow<'a, [u8]>, VaultError> {
        Ok(match *self {
            Self::Text(s) => Cow::Borrowed(s.as_bytes()),
            Self::Bytes(b) => Cow::Borrowed(b),
            Self::Json(v) => Cow::Owned(serde_json::to_vec(v)?),
        })
    }
}

impl<'a> From<&'a str> for Plaintext<'a> {
    fn from(value: &'a str) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a String> for Plaintext<'a> {
    fn from(value: &'a String) -> Self {
        Self::Text(value)
    }
}

impl<'a> From<&'a [u8]> for Plaintext<'a> {
    fn from(value: &'a [u8]) -> Self {
        Self::Bytes(value)
    }
}

impl<'a> From<&'a Vec<u8>> for Plaintext<'a> {
    fn from(value: &'a Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<'a> From<&'a serde_json::Value> for Plaintext<'a> {
    fn from(value: &'a serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Outcome of a fallible decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decrypted {
    /// Input was not an envelope and is returned as-is.
    Passthrough(String),
    /// Input was an envelope and opened successfully.
    Plaintext(String),
}

impl Decrypted {
    pub fn into_inner(self) -> String {
        match self {
            Self::Passthrough(s) | Self::Plaintext(s) => s,
        }
    }
}
