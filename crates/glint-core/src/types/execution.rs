use serde::{Deserialize, Serialize};

use crate::common::{Address, Bytes32};
use crate::mpt::rlp_codec::{decode_list_items, encode_list, encode_string, RlpItem};
use crate::mpt::MptError;

/// An Ethereum account as stored in the state trie, verified via an MPT
/// proof against a known state root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub nonce: u64,
    /// Wei, big-endian, to avoid precision loss in a u64/u128.
    pub balance: Bytes32,
    pub storage_root: Bytes32,
    pub code_hash: Bytes32,
}

impl AccountState {
    pub const EMPTY_CODE_HASH: [u8; 32] = [
        0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0, 0xe5, 0x00,
        0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
    ];

    pub const EMPTY_STORAGE_ROOT: [u8; 32] = [
        0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e, 0x5b, 0x48,
        0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
    ];

    pub fn is_contract(&self) -> bool {
        self.code_hash.as_slice() != Self::EMPTY_CODE_HASH
    }

    pub fn has_storage(&self) -> bool {
        self.storage_root.as_slice() != Self::EMPTY_STORAGE_ROOT
    }

    /// Decode the RLP-encoded account leaf value from the state trie:
    /// `[nonce, balance, storage_root, code_hash]`.
    pub fn decode_rlp(raw: &[u8]) -> Result<AccountState, MptError> {
        let items = decode_list_items(raw)?;
        if items.len() != 4 {
            return Err(MptError::InvalidAccount(format!("expected 4 RLP fields, got {}", items.len())));
        }
        let nonce = decode_rlp_u64(items[0].as_string()?)?;
        let balance = decode_rlp_u256(items[1].as_string()?)?;
        let storage_root = decode_rlp_hash32(items[2].as_string()?)?;
        let code_hash = decode_rlp_hash32(items[3].as_string()?)?;
        Ok(AccountState { nonce, balance: Bytes32::from(balance), storage_root: Bytes32::from(storage_root), code_hash: Bytes32::from(code_hash) })
    }

    pub fn encode_rlp(&self) -> Vec<u8> {
        let mut nonce_buf = Vec::new();
        encode_rlp_u64(self.nonce, &mut nonce_buf);
        let mut balance_buf = Vec::new();
        encode_string(trim_leading_zeros(self.balance.as_slice()), &mut balance_buf);
        let mut storage_buf = Vec::new();
        encode_string(self.storage_root.as_slice(), &mut storage_buf);
        let mut code_buf = Vec::new();
        encode_string(self.code_hash.as_slice(), &mut code_buf);
        let mut out = Vec::new();
        encode_list(&[nonce_buf, balance_buf, storage_buf, code_buf], &mut out);
        out
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[first_nonzero..]
}

fn decode_rlp_u64(bytes: &[u8]) -> Result<u64, MptError> {
    if bytes.len() > 8 {
        return Err(MptError::InvalidAccount("nonce field exceeds 8 bytes".into()));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf))
}

fn decode_rlp_u256(bytes: &[u8]) -> Result<[u8; 32], MptError> {
    if bytes.len() > 32 {
        return Err(MptError::InvalidAccount("balance field exceeds 32 bytes".into()));
    }
    let mut buf = [0u8; 32];
    buf[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(buf)
}

fn decode_rlp_hash32(bytes: &[u8]) -> Result<[u8; 32], MptError> {
    if bytes.is_empty() {
        return Ok([0u8; 32]);
    }
    if bytes.len() != 32 {
        return Err(MptError::InvalidAccount(format!("expected 32-byte hash, got {}", bytes.len())));
    }
    let mut buf = [0u8; 32];
    buf.copy_from_slice(bytes);
    Ok(buf)
}

fn encode_rlp_u64(value: u64, out: &mut Vec<u8>) {
    let be = value.to_be_bytes();
    encode_string(trim_leading_zeros(&be), out);
}

/// A Merkle-Patricia trie proof for an account, as returned by `eth_getProof`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountProof {
    pub address: Address,
    pub proof: Vec<Vec<u8>>,
    pub account: Option<AccountState>,
}

/// A Merkle-Patricia trie proof for a storage slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageProof {
    pub key: Bytes32,
    pub value: Bytes32,
    pub proof: Vec<Vec<u8>>,
}

/// A proof for a transaction receipt in the receipts trie.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceiptProof {
    pub tx_index: u64,
    pub proof: Vec<Vec<u8>>,
}

/// A verified transaction receipt (post-Byzantium status form).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub status: u8,
    pub cumulative_gas_used: u64,
    #[serde(with = "bloom_serde")]
    pub logs_bloom: [u8; 256],
    pub logs: Vec<Log>,
}

impl TransactionReceipt {
    /// Decode a receipt trie leaf value, stripping the EIP-2718 typed
    /// envelope byte when present (§4.5 item 4 — "decoded per EIP-2718
    /// envelope if byte 0 < 0x80").
    pub fn decode_rlp(raw: &[u8]) -> Result<TransactionReceipt, MptError> {
        let body = if raw.first().is_some_and(|&b| b < 0x80) { &raw[1..] } else { raw };
        let items = decode_list_items(body)?;
        if items.len() != 4 {
            return Err(MptError::InvalidReceipt(format!("expected 4 RLP fields, got {}", items.len())));
        }
        let status_bytes = items[0].as_string()?;
        let status = match status_bytes.len() {
            0 => 0,
            1 => status_bytes[0],
            _ => return Err(MptError::InvalidReceipt("status field longer than 1 byte".into())),
        };
        let cumulative_gas_used = decode_rlp_u64(items[1].as_string()?)?;
        let bloom_bytes = items[2].as_string()?;
        if bloom_bytes.len() != 256 {
            return Err(MptError::InvalidReceipt(format!("bloom must be 256 bytes, got {}", bloom_bytes.len())));
        }
        let mut logs_bloom = [0u8; 256];
        logs_bloom.copy_from_slice(bloom_bytes);

        let log_items = match &items[3] {
            RlpItem::List(raw) => decode_list_items(raw)?,
            RlpItem::String(_) => return Err(MptError::InvalidReceipt("logs field is not a list".into())),
        };
        let mut logs = Vec::with_capacity(log_items.len());
        for item in &log_items {
            logs.push(Log::decode_rlp_item(item)?);
        }
        Ok(TransactionReceipt { status, cumulative_gas_used, logs_bloom, logs })
    }
}

mod bloom_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bloom: &[u8; 256], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bloom))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 256], D::Error> {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(s).map_err(serde::de::Error::custom)?;
        if bytes.len() != 256 {
            return Err(serde::de::Error::custom("bloom must be 256 bytes"));
        }
        let mut arr = [0u8; 256];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }
}

/// A log entry emitted by a smart contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Bytes32>,
    pub data: Vec<u8>,
}

impl Log {
    fn decode_rlp_item(item: &RlpItem) -> Result<Log, MptError> {
        let raw = match item {
            RlpItem::List(raw) => raw,
            RlpItem::String(_) => return Err(MptError::InvalidReceipt("log entry is not a list".into())),
        };
        let fields = decode_list_items(raw)?;
        if fields.len() != 3 {
            return Err(MptError::InvalidReceipt(format!("log entry expected 3 fields, got {}", fields.len())));
        }
        let addr_bytes = fields[0].as_string()?;
        if addr_bytes.len() != 20 {
            return Err(MptError::InvalidReceipt("log address must be 20 bytes".into()));
        }
        let address = Address::from_slice(addr_bytes);
        let topic_items = match &fields[1] {
            RlpItem::List(raw) => decode_list_items(raw)?,
            RlpItem::String(_) => return Err(MptError::InvalidReceipt("log topics field is not a list".into())),
        };
        let mut topics = Vec::with_capacity(topic_items.len());
        for t in &topic_items {
            let bytes = t.as_string()?;
            if bytes.len() != 32 {
                return Err(MptError::InvalidReceipt("log topic must be 32 bytes".into()));
            }
            topics.push(Bytes32::from_slice(bytes));
        }
        let data = fields[2].as_string()?.to_vec();
        Ok(Log { address, topics, data })
    }
}

/// Full proof response from `eth_getProof`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EthGetProofResponse {
    pub account_proof: AccountProof,
    pub storage_proofs: Vec<StorageProof>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_rlp_roundtrip() {
        let account = AccountState {
            nonce: 7,
            balance: Bytes32::from([0x01u8; 32]),
            storage_root: Bytes32::from(AccountState::EMPTY_STORAGE_ROOT),
            code_hash: Bytes32::from(AccountState::EMPTY_CODE_HASH),
        };
        let raw = account.encode_rlp();
        let decoded = AccountState::decode_rlp(&raw).unwrap();
        assert_eq!(account, decoded);
    }

    #[test]
    fn eoa_has_no_code_and_no_storage() {
        let eoa = AccountState {
            nonce: 0,
            balance: Bytes32::ZERO,
            storage_root: Bytes32::from(AccountState::EMPTY_STORAGE_ROOT),
            code_hash: Bytes32::from(AccountState::EMPTY_CODE_HASH),
        };
        assert!(!eoa.is_contract());
        assert!(!eoa.has_storage());
    }
}
