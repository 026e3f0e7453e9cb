//! Fixed-size binary encoding of clear values and shares exchanged between parties.

use crate::{error::ProtocolError, fields::MpcRing};

/// Concatenate encodings of `values`.
pub fn encode_values<'a, T: MpcRing>(values: impl IntoIterator<Item = &'a T>) -> Vec<u8> {
    let values = values.into_iter();
    let mut bytes = Vec::with_capacity(values.size_hint().0 * T::BYTES);
    for value in values {
        value.write_bytes(&mut bytes);
    }
    bytes
}

/// Decode a buffer produced by [`encode_values`]. If `expected` is set the buffer must hold
/// exactly that many values.
pub fn decode_values<T: MpcRing>(
    bytes: &[u8],
    expected: Option<usize>,
) -> Result<Vec<T>, ProtocolError> {
    if bytes.len() % T::BYTES != 0 {
        return Err(ProtocolError::InvalidShareSet(format!(
            "payload of {} bytes is not a multiple of {}",
            bytes.len(),
            T::BYTES
        )));
    }
    let count = bytes.len() / T::BYTES;
    if let Some(expected) = expected {
        if count != expected {
            return Err(ProtocolError::InvalidShareSet(format!(
                "expected {expected} values, received {count}"
            )));
        }
    }
    bytes
        .chunks_exact(T::BYTES)
        .map(|chunk| {
            T::read_bytes(chunk).ok_or_else(|| {
                ProtocolError::InvalidShareSet("non-canonical element encoding".to_string())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Mersenne61, Z64};

    #[test]
    fn test_decode_rejects_wrong_length() {
        let bytes = encode_values(&[Z64(1), Z64(2), Z64(3)]);
        assert_eq!(
            decode_values::<Z64>(&bytes, Some(3)),
            Ok(vec![Z64(1), Z64(2), Z64(3)])
        );
        assert!(matches!(
            decode_values::<Z64>(&bytes, Some(2)),
            Err(ProtocolError::InvalidShareSet(_))
        ));
        assert!(matches!(
            decode_values::<Z64>(&bytes[1..], None),
            Err(ProtocolError::InvalidShareSet(_))
        ));
    }

    #[test]
    fn test_decode_rejects_out_of_range_field_element() {
        let bytes = u64::MAX.to_le_bytes();
        assert!(matches!(
            decode_values::<Mersenne61>(&bytes, None),
            Err(ProtocolError::InvalidShareSet(_))
        ));
    }
}
