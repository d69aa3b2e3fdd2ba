//! Thin item-level RLP framing built on `alloy_rlp::Header`, replacing the
//! teacher's hand-rolled `decode_rlp_list_payload`/`decode_rlp_item` prefix
//! arithmetic. Trie nodes are the one place in this codebase that needs to
//! inspect RLP structurally (is this item a string or a nested list?)
//! rather than decode straight into a typed value, so we work at the
//! `Header` level rather than deriving `Encodable`/`Decodable` on a
//! `TrieNode` struct.

use alloy_rlp::{Encodable, Header};

use super::MptError;

/// One decoded item inside an RLP list: either a byte string, or a nested
/// list's raw encoded bytes (a trie child small enough to be embedded
/// directly rather than referenced by hash, §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    String(Vec<u8>),
    /// Full encoded bytes of a nested list item, header included.
    List(Vec<u8>),
}

impl RlpItem {
    pub fn as_string(&self) -> Result<&[u8], MptError> {
        match self {
            RlpItem::String(bytes) => Ok(bytes),
            RlpItem::List(_) => Err(MptError::InvalidRlp {
                index: 0,
                reason: "expected a byte string, found a nested list".to_string(),
            }),
        }
    }
}

/// Encode a byte string using `alloy_rlp`'s string-encoding rules (single
/// byte < 0x80 passes through unprefixed).
pub fn encode_string(bytes: &[u8], out: &mut Vec<u8>) {
    bytes.encode(out);
}

pub fn string_len(bytes: &[u8]) -> usize {
    bytes.length()
}

/// Wrap already-encoded item bytes into an RLP list.
pub fn encode_list(items: &[Vec<u8>], out: &mut Vec<u8>) {
    let payload_length: usize = items.iter().map(|i| i.len()).sum();
    Header { list: true, payload_length }.encode(out);
    for item in items {
        out.extend_from_slice(item);
    }
}

/// Split a buffer believed to hold exactly one RLP-encoded list into its
/// top-level items, without fully decoding each item's contents.
pub fn decode_list_items(data: &[u8]) -> Result<Vec<RlpItem>, MptError> {
    let mut buf = data;
    let header = Header::decode(&mut buf).map_err(|e| MptError::InvalidRlp { index: 0, reason: e.to_string() })?;
    if !header.list {
        return Err(MptError::InvalidRlp { index: 0, reason: "expected a list, found a string".to_string() });
    }
    if buf.len() < header.payload_length {
        return Err(MptError::InvalidRlp { index: 0, reason: "truncated list payload".to_string() });
    }
    let mut payload = &buf[..header.payload_length];

    let mut items = Vec::new();
    while !payload.is_empty() {
        let item_start = payload;
        let item_header = Header::decode(&mut payload)
            .map_err(|e| MptError::InvalidRlp { index: items.len(), reason: e.to_string() })?;
        let header_len = item_start.len() - payload.len();
        if payload.len() < item_header.payload_length {
            return Err(MptError::InvalidRlp { index: items.len(), reason: "truncated item payload".to_string() });
        }
        let item_payload = &payload[..item_header.payload_length];
        if item_header.list {
            let total_len = header_len + item_header.payload_length;
            items.push(RlpItem::List(item_start[..total_len].to_vec()));
        } else {
            items.push(RlpItem::String(item_payload.to_vec()));
        }
        payload = &payload[item_header.payload_length..];
    }
    Ok(items)
}

/// Decode a lone RLP byte string (used for storage values, which are
/// themselves RLP-wrapped raw bytes).
pub fn decode_string(data: &[u8]) -> Result<Vec<u8>, MptError> {
    let mut buf = data;
    let header = Header::decode(&mut buf).map_err(|e| MptError::InvalidRlp { index: 0, reason: e.to_string() })?;
    if header.list {
        return Err(MptError::InvalidRlp { index: 0, reason: "expected a string, found a list".to_string() });
    }
    if buf.len() < header.payload_length {
        return Err(MptError::InvalidRlp { index: 0, reason: "truncated string payload".to_string() });
    }
    Ok(buf[..header.payload_length].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_of_strings_roundtrips() {
        let mut a = Vec::new();
        encode_string(b"hello", &mut a);
        let mut b = Vec::new();
        encode_string(b"world!!", &mut b);
        let mut out = Vec::new();
        encode_list(&[a, b], &mut out);

        let items = decode_list_items(&out).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_string().unwrap(), b"hello");
        assert_eq!(items[1].as_string().unwrap(), b"world!!");
    }

    #[test]
    fn nested_list_item_is_preserved_whole() {
        let mut inner_a = Vec::new();
        encode_string(b"x", &mut inner_a);
        let mut inner = Vec::new();
        encode_list(&[inner_a], &mut inner);

        let mut out = Vec::new();
        encode_list(&[inner.clone()], &mut out);

        let items = decode_list_items(&out).unwrap();
        assert_eq!(items.len(), 1);
        match &items[0] {
            RlpItem::List(raw) => assert_eq!(raw, &inner),
            RlpItem::String(_) => panic!("expected nested list"),
        }
    }
}
