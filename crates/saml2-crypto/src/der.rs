//! Minimal DER handling for RSA public keys.
//!
//! Only the two shapes that appear in practice are understood:
//! PKCS#1 `RSAPublicKey` and `SubjectPublicKeyInfo` wrapping one.

use crate::error::{CryptoError, CryptoResult};

const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_SEQUENCE: u8 = 0x30;

/// Extracts modulus and exponent (big-endian, without sign padding).
pub(crate) fn rsa_components(der: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let (outer, _) = read_tlv(der, 0, TAG_SEQUENCE)?;
    match outer.first() {
        Some(&TAG_INTEGER) => read_rsa_public_key(outer),
        Some(&TAG_SEQUENCE) => {
            // SubjectPublicKeyInfo: skip AlgorithmIdentifier, open the BIT STRING
            let (_, next) = read_tlv(outer, 0, TAG_SEQUENCE)?;
            let (bits, _) = read_tlv(outer, next, TAG_BIT_STRING)?;
            let key = bits
                .split_first()
                .map(|(_, rest)| rest)
                .ok_or_else(|| invalid("empty BIT STRING"))?;
            let (inner, _) = read_tlv(key, 0, TAG_SEQUENCE)?;
            read_rsa_public_key(inner)
        }
        _ => Err(invalid("expected RSAPublicKey or SubjectPublicKeyInfo")),
    }
}

/// Encodes `RSAPublicKey ::= SEQUENCE { modulus INTEGER, publicExponent INTEGER }`.
pub(crate) fn encode_rsa_public_key(modulus: &[u8], exponent: &[u8]) -> Vec<u8> {
    let mut body = encode_unsigned_integer(modulus);
    body.extend(encode_unsigned_integer(exponent));
    let mut out = vec![TAG_SEQUENCE];
    out.extend(encode_length(body.len()));
    out.extend(body);
    out
}

/// Strips leading zero octets from a big-endian unsigned integer.
pub(crate) fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[first..].to_vec()
}

fn read_rsa_public_key(seq: &[u8]) -> CryptoResult<(Vec<u8>, Vec<u8>)> {
    let (n, next) = read_tlv(seq, 0, TAG_INTEGER)?;
    let (e, _) = read_tlv(seq, next, TAG_INTEGER)?;
    Ok((strip_leading_zeros(n), strip_leading_zeros(e)))
}

/// Reads one TLV with the expected tag at `pos`, returning its contents
/// and the position right after it.
fn read_tlv(data: &[u8], pos: usize, tag: u8) -> CryptoResult<(&[u8], usize)> {
    if data.get(pos) != Some(&tag) {
        return Err(invalid(&format!("expected tag 0x{tag:02x} at offset {pos}")));
    }
    let len = read_length(data, pos + 1)?;
    let start = skip_length(data, pos + 1)?;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| invalid("length exceeds input"))?;
    Ok((&data[start..end], end))
}

fn read_length(data: &[u8], pos: usize) -> CryptoResult<usize> {
    let first = *data.get(pos).ok_or_else(|| invalid("unexpected end of data"))?;
    if first < 0x80 {
        return Ok(usize::from(first));
    }
    let num_bytes = usize::from(first & 0x7F);
    if num_bytes == 0 || num_bytes > 4 {
        return Err(invalid("unsupported length encoding"));
    }
    let mut len = 0usize;
    for i in 0..num_bytes {
        let byte = *data
            .get(pos + 1 + i)
            .ok_or_else(|| invalid("unexpected end of length"))?;
        len = (len << 8) | usize::from(byte);
    }
    Ok(len)
}

fn skip_length(data: &[u8], pos: usize) -> CryptoResult<usize> {
    let first = *data.get(pos).ok_or_else(|| invalid("unexpected end of data"))?;
    if first < 0x80 {
        Ok(pos + 1)
    } else {
        Ok(pos + 1 + usize::from(first & 0x7F))
    }
}

fn encode_unsigned_integer(value: &[u8]) -> Vec<u8> {
    let mut content = strip_leading_zeros(value);
    if content.first().map_or(true, |&b| b & 0x80 != 0) {
        content.insert(0, 0);
    }
    let mut out = vec![TAG_INTEGER];
    out.extend(encode_length(content.len()));
    out.extend(content);
    out
}

fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        // fits in the short form
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = vec![0x80 | bytes.len() as u8];
    out.extend(bytes);
    out
}

fn invalid(msg: &str) -> CryptoError {
    CryptoError::InvalidKey(format!("malformed DER: {msg}"))
}
