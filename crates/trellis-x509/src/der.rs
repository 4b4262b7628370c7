//! Minimal DER encoding and decoding.
//!
//! The bridge only handles a handful of shapes: the custom extension's
//! BIT STRING payload and the SubjectPublicKeyInfo encodings it compares
//! against the certificate, plus the building blocks the test kit uses to
//! assemble certificate shells. A full ASN.1 stack is not warranted for
//! that.

use crate::BridgeError;

/// DER arc encoding of `2.25.49058212633447845622587297037800555803`, the
/// object identifier of the embedded-key certificate extension (derived
/// from UUID 24e844a0-6cbc-11e3-8997-0002a5d5c51b).
pub(crate) const KEY_BLOCK_OID: &[u8] = &[
    0x69, 0xC9, 0xE8, 0xA2, 0xA8, 0x8D, 0xCB, 0xE0, 0xC7, 0xC7, 0x89, 0xCB, 0xC0, 0x80, 0xAA,
    0xAE, 0xD7, 0x8A, 0x1B,
];

pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_BIT_STRING: u8 = 0x03;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_NULL: u8 = 0x05;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_UTC_TIME: u8 = 0x17;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;

/// Encodes one tag-length-value triple.
pub(crate) fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
        out.push(0x80 | (bytes.len() - first) as u8);
        out.extend_from_slice(&bytes[first..]);
    }
    out.extend_from_slice(content);
    out
}

/// Encodes a SEQUENCE of pre-encoded elements.
pub(crate) fn sequence(elements: &[&[u8]]) -> Vec<u8> {
    tlv(TAG_SEQUENCE, &elements.concat())
}

/// Encodes a BIT STRING with no unused bits.
pub(crate) fn bit_string(payload: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(payload.len() + 1);
    content.push(0);
    content.extend_from_slice(payload);
    tlv(TAG_BIT_STRING, &content)
}

/// Encodes an INTEGER from unsigned big-endian magnitude bytes, inserting
/// the sign octet when the high bit is set.
pub(crate) fn unsigned_integer(magnitude: &[u8]) -> Vec<u8> {
    let trimmed: &[u8] = {
        let start = magnitude.iter().position(|&b| b != 0);
        match start {
            Some(i) => &magnitude[i..],
            None => &[0],
        }
    };
    if trimmed[0] & 0x80 != 0 {
        let mut content = Vec::with_capacity(trimmed.len() + 1);
        content.push(0);
        content.extend_from_slice(trimmed);
        tlv(TAG_INTEGER, &content)
    } else {
        tlv(TAG_INTEGER, trimmed)
    }
}

/// Decodes a DER BIT STRING and returns its payload.
///
/// The extension format requires a whole number of octets, so a non-zero
/// unused-bit count is malformed.
pub(crate) fn parse_bit_string(data: &[u8]) -> Result<&[u8], BridgeError> {
    let (tag, content, rest) = parse_tlv(data)?;
    if tag != TAG_BIT_STRING || !rest.is_empty() || content.is_empty() || content[0] != 0 {
        return Err(BridgeError::MalformedExtension(
            "extension value is not a byte-aligned BIT STRING".into(),
        ));
    }
    Ok(&content[1..])
}

/// Splits one TLV off the front of `data`.
pub(crate) fn parse_tlv(data: &[u8]) -> Result<(u8, &[u8], &[u8]), BridgeError> {
    let malformed = || BridgeError::MalformedExtension("truncated DER value".into());
    let (&tag, rest) = data.split_first().ok_or_else(malformed)?;
    let (&first, rest) = rest.split_first().ok_or_else(malformed)?;
    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7f) as usize;
        if count == 0 || count > std::mem::size_of::<usize>() || rest.len() < count {
            return Err(malformed());
        }
        let mut len = 0usize;
        for &b in &rest[..count] {
            len = (len << 8) | b as usize;
        }
        (len, &rest[count..])
    };
    if rest.len() < len {
        return Err(malformed());
    }
    Ok((tag, &rest[..len], &rest[len..]))
}
