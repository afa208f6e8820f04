//! Conversion between fixed-size values and little-endian payload words.

use crate::types::Guid;

/// A fixed-size value stored in `ceil(BYTES / 4)` payload words.
pub trait WordData: Sized {
    /// Encoded size in bytes.
    const BYTES: usize;

    /// Decode from exactly `BYTES` little-endian bytes.
    fn decode(bytes: &[u8]) -> Self;

    /// Append the little-endian encoding to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Number of payload words the value occupies.
    #[must_use]
    fn word_count() -> usize {
        word_count(Self::BYTES)
    }
}

macro_rules! impl_word_data {
    ($($ty:ty),* $(,)?) => {$(
        impl WordData for $ty {
            const BYTES: usize = std::mem::size_of::<$ty>();

            fn decode(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::BYTES]);
                <$ty>::from_le_bytes(raw)
            }

            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    )*};
}

impl_word_data!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl WordData for Guid {
    const BYTES: usize = 8;

    fn decode(bytes: &[u8]) -> Self {
        Self::new(u32::decode(&bytes[..4]), u32::decode(&bytes[4..8]))
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.d1.encode(out);
        self.d2.encode(out);
    }
}

/// Words needed for `bytes` bytes.
#[must_use]
pub(crate) fn word_count(bytes: usize) -> usize {
    bytes.div_ceil(4)
}

/// Flatten words into little-endian bytes.
#[must_use]
pub(crate) fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_le_bytes()).collect()
}

/// Pack bytes into words, zero-padding the last one.
#[must_use]
pub(crate) fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut raw = [0u8; 4];
            raw[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(raw)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counts() {
        assert_eq!(u8::word_count(), 1);
        assert_eq!(u32::word_count(), 1);
        assert_eq!(f64::word_count(), 2);
        assert_eq!(Guid::word_count(), 2);
        assert_eq!(word_count(0), 0);
        assert_eq!(word_count(5), 2);
    }

    #[test]
    fn test_bytes_words_padding() {
        let words = bytes_to_words(&[1, 2, 3, 4, 5]);
        assert_eq!(words, vec![0x0403_0201, 5]);
        assert_eq!(words_to_bytes(&words), vec![1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn test_guid_encoding() {
        let mut out = Vec::new();
        Guid::new(1, 2).encode(&mut out);
        assert_eq!(out, vec![1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(Guid::decode(&out), Guid::new(1, 2));
    }
}
