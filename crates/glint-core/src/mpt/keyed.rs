//! The four trie-key derivations the verifier pipeline needs (§4.5 step 4):
//! accounts and storage slots are keyed by their keccak256 hash, while
//! transactions and receipts are keyed by the RLP encoding of their index
//! directly (no hashing — the transaction/receipt trie's key is positional).

use super::node::keccak256;
use crate::common::{Address, Bytes32};

pub fn state_key(address: &Address) -> Bytes32 {
    Bytes32::from(keccak256(address.as_slice()))
}

pub fn storage_key(slot: &Bytes32) -> Bytes32 {
    Bytes32::from(keccak256(slot.as_slice()))
}

/// RLP-encode a small unsigned integer the way `alloy_rlp` encodes a `u64`:
/// no leading zero bytes, and the single-byte fast path for values < 0x80.
pub fn rlp_index(index: u64) -> Vec<u8> {
    use alloy_rlp::Encodable;
    let mut out = Vec::new();
    index.encode(&mut out);
    out
}

pub fn tx_key(tx_index: u64) -> Vec<u8> {
    rlp_index(tx_index)
}

pub fn receipt_key(tx_index: u64) -> Vec<u8> {
    rlp_index(tx_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rlp_index_small_values_are_single_byte() {
        assert_eq!(rlp_index(0), vec![0x80]);
        assert_eq!(rlp_index(1), vec![0x01]);
        assert_eq!(rlp_index(127), vec![0x7f]);
    }

    #[test]
    fn rlp_index_multi_byte() {
        assert_eq!(rlp_index(128), vec![0x81, 0x80]);
        assert_eq!(rlp_index(256), vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn state_key_hashes_the_address() {
        let addr = Address::from([0x11u8; 20]);
        let key = state_key(&addr);
        assert_eq!(key, Bytes32::from(keccak256(addr.as_slice())));
    }
}
