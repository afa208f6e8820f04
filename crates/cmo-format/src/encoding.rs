//! Native string encodings used for object names and chunk strings.

use std::fmt;

use encoding_rs::Encoding;

use crate::error::{CmoError, Result};

/// Ordered list of candidate native encodings.
///
/// Conversions try each encoding in order and the first one that succeeds
/// wins. An empty list never converts anything.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EncodingList {
    encodings: Vec<&'static Encoding>,
}

impl EncodingList {
    /// Build a list from WHATWG labels such as `windows-1252` or `gbk`.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut encodings = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            let encoding = Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                CmoError::invalid_parameter(format!("unknown encoding: {label}"))
            })?;
            encodings.push(encoding);
        }
        Ok(Self { encodings })
    }

    /// Parse a comma separated label list.
    pub fn parse(labels: &str) -> Result<Self> {
        Self::from_labels(labels.split(',').filter(|label| !label.trim().is_empty()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encodings.is_empty()
    }

    /// Canonical names of the configured encodings.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.encodings.iter().map(|encoding| encoding.name()).collect()
    }

    /// Decode native bytes to UTF-8 with the first encoding that accepts them.
    #[must_use]
    pub fn to_utf8(&self, native: &[u8]) -> Option<String> {
        self.encodings.iter().find_map(|encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(native)
                .map(|text| text.into_owned())
        })
    }

    /// Encode UTF-8 text with the first encoding that represents it exactly.
    #[must_use]
    pub fn to_native(&self, text: &str) -> Option<Vec<u8>> {
        self.encodings.iter().find_map(|encoding| {
            let (bytes, _, had_errors) = encoding.encode(text);
            (!had_errors).then(|| bytes.into_owned())
        })
    }

    /// Decode, falling back to a lossy byte copy.
    ///
    /// The flag is `false` when no encoding accepted the bytes.
    #[must_use]
    pub fn to_utf8_or_copy(&self, native: &[u8]) -> (String, bool) {
        match self.to_utf8(native) {
            Some(text) => (text, true),
            None => (String::from_utf8_lossy(native).into_owned(), false),
        }
    }

    /// Encode, falling back to the raw UTF-8 bytes.
    #[must_use]
    pub fn to_native_or_copy(&self, text: &str) -> (Vec<u8>, bool) {
        match self.to_native(text) {
            Some(bytes) => (bytes, true),
            None => (text.as_bytes().to_vec(), false),
        }
    }
}

impl fmt::Debug for EncodingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
