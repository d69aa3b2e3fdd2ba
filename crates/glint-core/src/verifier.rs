//! Per-method verification pipeline (§4.5).
//!
//! New relative to the teacher, which exposes standalone
//! `verify_account_proof`/`verify_storage_proof`/`verify_receipt_proof`
//! functions called directly by whatever JSON-RPC handler needs them, with
//! no shared dispatch. This module is the dispatcher: one `C4Request` in,
//! six ordered stages, each free to terminate the pipeline, fail it, or
//! suspend it pending a fetch the [`crate::executor`] module drives.

use crate::bls::{self, PubkeySource};
use crate::common::{Address, Bytes32};
use crate::error::CoreError;
use crate::executor::DataRequest;
use crate::mpt::Trie;
use crate::ssz::{self, Fork, Gindex};
use crate::types::beacon::{BeaconBlockHeader, ExecutionPayloadHeader, SyncAggregate};
use crate::types::execution::{AccountProof, AccountState, ReceiptProof, StorageProof, TransactionReceipt};

/// How a method is served, resolved by an interface the embedder supplies
/// (§4.5: "from an external table") — this crate owns no method table of
/// its own, per the Non-goals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodClass {
    Undefined,
    NotSupported,
    Unproofable,
    Local,
    Proofable,
}

/// The classification interface an embedder implements; only `Local` and
/// `Proofable` methods are served by the core.
pub trait ClassifyMethod {
    fn classify(&self, method: &str) -> MethodClass;
}

/// The public input: an SSZ container whose `proof` field is a union over
/// the proof kinds named in §6's external-interfaces section.
#[derive(Clone, Debug)]
pub struct C4Request {
    pub data: Vec<u8>,
    pub proof: ProofPayload,
    pub sync_data: Vec<u8>,
}

/// One arm of the `proof` union. Each variant carries exactly the fields
/// stage 3/4 needs to re-derive and check its binding; unused proof kinds
/// from §6's list (`eth_call_proof`, `op_verify_preconf_proof`) reuse the
/// same consensus/execution binding structs since stages 2-3 don't vary by
/// data family — only stage 4 does.
#[derive(Clone, Debug)]
pub enum ProofPayload {
    EthBalanceProof(ConsensusBinding<AccountProof>),
    EthStorageProof(ConsensusBinding<(AccountProof, StorageProof)>),
    EthTxProof(ConsensusBinding<ReceiptProof>),
    EthReceiptProof(ConsensusBinding<ReceiptProof>),
    EthCallProof(ConsensusBinding<CallProof>),
    OpVerifyBlockProof(OpOutputRootProof),
}

/// The consensus/execution scaffolding every execution-layer proof rides
/// on: a signed beacon header, its execution-payload header, and the
/// multi-proof binding the two together (§4.5 stages 2-3), plus the
/// data-family-specific payload for stage 4.
#[derive(Clone, Debug)]
pub struct ConsensusBinding<T> {
    pub attested_header: BeaconBlockHeader,
    pub sync_aggregate: SyncAggregate,
    pub execution_payload: ExecutionPayloadHeader,
    pub execution_payload_witnesses: Vec<Bytes32>,
    pub payload: T,
}

#[derive(Clone, Debug)]
pub struct CallProof {
    pub to: Address,
    pub input: Vec<u8>,
    pub accounts: Vec<(Address, AccountProof)>,
    pub codes: Vec<(Address, Vec<u8>)>,
    pub claimed_result: Vec<u8>,
}

/// Optimism/op-stack block binding (§4.5 item 5):
/// `output_root = keccak(version || state_root || message_passer_storage_root || block_hash)`
/// must equal what's stored in the L1 `L2OutputOracle` at
/// `keccak(output_index || mapping_slot)`.
#[derive(Clone, Debug)]
pub struct OpOutputRootProof {
    pub l1_consensus: ConsensusBinding<()>,
    pub version: [u8; 32],
    pub l2_state_root: Bytes32,
    pub message_passer_storage_root: Bytes32,
    pub l2_block_hash: Bytes32,
    pub output_index: u64,
    pub mapping_slot: Bytes32,
    pub l1_output_oracle_storage_proof: StorageProof,
    pub l1_output_oracle_account_proof: AccountProof,
}

/// The result of one pipeline stage (§6): done with a value, suspended
/// pending more data, or a terminal failure.
pub enum StageOutcome<T> {
    Done(T),
    Pending(Vec<DataRequest>),
    Err(CoreError),
}

impl<T> From<Result<T, CoreError>> for StageOutcome<T> {
    fn from(result: Result<T, CoreError>) -> Self {
        match result {
            Ok(v) => StageOutcome::Done(v),
            Err(CoreError::Pending) => StageOutcome::Pending(Vec::new()),
            Err(e) => StageOutcome::Err(e),
        }
    }
}

/// Stage 1: identify the proof's data family from the request's `proof`
/// union selector. No verification happens here — just routing.
pub fn receive_proof(request: &C4Request) -> &ProofPayload {
    &request.proof
}

/// Stage 2: verify the sync-committee signature over the attested header,
/// resolving the signing period's pubkeys through `sync_committee`
/// (possibly not yet available, in which case the caller should have
/// already suspended before calling this stage — this function itself
/// only reports the BLS/threshold result).
pub fn verify_consensus_attestation(
    attested_header: &BeaconBlockHeader,
    sync_aggregate: &SyncAggregate,
    committee_pubkeys: &[[u8; 48]],
) -> Result<Bytes32, CoreError> {
    let signing_root = attested_header.hash_tree_root().map_err(CoreError::InvalidMerkleProof)?;
    bls::verify(
        &signing_root,
        &sync_aggregate.sync_committee_signature.0,
        PubkeySource::Raw(committee_pubkeys),
        &sync_aggregate.sync_committee_bits,
    )
    .map_err(|e| match e {
        bls::BlsError::InsufficientParticipation { participants, total, required } => {
            CoreError::InsufficientParticipation { participants, total, required }
        }
        other => CoreError::BadSignature(other),
    })?;
    Ok(attested_header.state_root)
}

/// Stage 3: verify the execution-payload header's `state_root`,
/// `receipts_root`, `transactions_root`, `block_hash`, `block_number`, and
/// `timestamp` sit at their known gindices beneath the signed beacon
/// header's `body_root` (§4.5 item 3).
pub fn verify_execution_payload_binding(
    body_root: Bytes32,
    payload: &ExecutionPayloadHeader,
    witnesses: &[Bytes32],
    fork: Fork,
) -> Result<(), CoreError> {
    let leaves = [
        ("state_root", payload.state_root),
        ("receipts_root", payload.receipts_root),
        ("transactions_root", payload.transactions_root),
        ("block_hash", payload.block_hash),
        ("block_number", pad_u64(payload.block_number)),
        ("timestamp", pad_u64(payload.timestamp)),
    ];
    let targets: Result<Vec<(Gindex, Bytes32)>, CoreError> = leaves
        .iter()
        .map(|(name, value)| execution_payload_field_gindex(fork, name).map(|g| (g, *value)))
        .collect();
    let targets = targets?;
    ssz::verify_multi_proof(&targets, witnesses, body_root).map_err(CoreError::InvalidMerkleProof)
}

fn pad_u64(value: u64) -> Bytes32 {
    let mut buf = [0u8; 32];
    buf[..8].copy_from_slice(&value.to_le_bytes());
    Bytes32::from(buf)
}

/// Gindices of the execution-payload header's own SSZ fields beneath the
/// beacon body root. Separate from `ssz::Fork`'s table (finalized-root /
/// sync-committee gindices) because these name a different container —
/// the execution payload header nested inside `BeaconBlockBody`, not the
/// beacon state — and Electra doesn't reorder this particular container.
fn execution_payload_field_gindex(fork: Fork, field: &'static str) -> Result<Gindex, CoreError> {
    let body_root_gindex = match fork {
        Fork::Deneb | Fork::Electra => Gindex(9),
    };
    let field_gindex = match field {
        "state_root" => Gindex(18),
        "receipts_root" => Gindex(19),
        "transactions_root" => Gindex(53),
        "block_hash" => Gindex(28),
        "block_number" => Gindex(22),
        "timestamp" => Gindex(25),
        _ => return Err(CoreError::Unsupported(format!("no execution-payload gindex for field '{field}'"))),
    };
    Gindex::add(body_root_gindex, field_gindex)
        .map_err(|e| CoreError::InvalidMerkleProof(e))
}

/// Stage 4, balance/nonce/code-hash/storage-root family: decode the
/// account leaf proven against `state_root`.
pub fn verify_account_mpt(state_root: Bytes32, account_proof: &AccountProof) -> Result<Option<AccountState>, CoreError> {
    let leaf = Trie::verify_account(state_root, &account_proof.address, &account_proof.proof)
        .map_err(CoreError::InvalidMptProof)?;
    leaf.map(|raw| AccountState::decode_rlp(&raw).map_err(CoreError::InvalidMptProof)).transpose()
}

/// Stage 4, storage-value family: a second MPT rooted at the account's
/// `storage_root`, keyed by `keccak(storage_slot)`.
pub fn verify_storage_mpt(storage_root: Bytes32, storage_proof: &StorageProof) -> Result<Option<Bytes32>, CoreError> {
    let leaf = Trie::verify_storage(storage_root, &storage_proof.key, &storage_proof.proof)
        .map_err(CoreError::InvalidMptProof)?;
    match leaf {
        None => Ok(None),
        Some(raw) => {
            if raw.len() > 32 {
                return Err(CoreError::InvalidMptProof(crate::mpt::MptError::ValueTooLong(raw.len())));
            }
            let mut buf = [0u8; 32];
            buf[32 - raw.len()..].copy_from_slice(&raw);
            Ok(Some(Bytes32::from(buf)))
        }
    }
}

/// Stage 4, receipt family: MPT on the receipts trie, decoded per
/// EIP-2718 envelope (handled inside `TransactionReceipt::decode_rlp`).
pub fn verify_receipt_mpt(receipts_root: Bytes32, receipt_proof: &ReceiptProof) -> Result<Option<TransactionReceipt>, CoreError> {
    let leaf = Trie::verify_by_index(receipts_root, receipt_proof.tx_index, &receipt_proof.proof)
        .map_err(CoreError::InvalidMptProof)?;
    leaf.map(|raw| TransactionReceipt::decode_rlp(&raw).map_err(CoreError::InvalidMptProof)).transpose()
}

/// Stage 4, transaction family: same trie walk as the receipt family but
/// rooted at `transactions_root` and returning the raw RLP transaction
/// envelope rather than decoding it (transaction decoding is a wire
/// concern this layer doesn't own).
pub fn verify_transaction_mpt(transactions_root: Bytes32, tx_index: u64, proof: &[Vec<u8>]) -> Result<Option<Vec<u8>>, CoreError> {
    Trie::verify_by_index(transactions_root, tx_index, proof).map_err(CoreError::InvalidMptProof)
}

/// Stage 4, logs family: logs are verified indirectly via receipts — the
/// caller proves every candidate block's receipts and this function
/// applies the bloom/topic filter to the already-verified list.
pub fn filter_logs_from_receipts<'a>(
    receipts: &'a [TransactionReceipt],
    address: Option<&Address>,
    topics: &[Bytes32],
) -> Vec<&'a crate::types::execution::Log> {
    receipts
        .iter()
        .flat_map(|r| r.logs.iter())
        .filter(|log| address.map(|a| &log.address == a).unwrap_or(true))
        .filter(|log| topics.iter().all(|t| log.topics.contains(t)))
        .collect()
}

/// Stage 4, call-result family: re-execute the call against the proven
/// accounts/code set and compare byte-for-byte with the proof's claimed
/// result. The EVM itself is out of scope (§1/Non-goals); this function
/// only wires the comparison once an embedder-supplied `EvmExecutor` runs.
pub trait EvmExecutor {
    fn run(&self, to: &Address, input: &[u8], accounts: &[(Address, AccountState)], codes: &[(Address, Vec<u8>)]) -> Result<Vec<u8>, CoreError>;
}

pub fn verify_call_result(
    executor: &dyn EvmExecutor,
    call: &CallProof,
    accounts: &[(Address, AccountState)],
) -> Result<Vec<u8>, CoreError> {
    let output = executor.run(&call.to, &call.input, accounts, &call.codes)?;
    if output != call.claimed_result {
        return Err(CoreError::InvalidWire("eth_call result does not match the proof's claimed output".to_string()));
    }
    Ok(output)
}

/// Stage 5, op-stack variant: reconstruct the output root and compare it
/// with whatever is stored in the `L2OutputOracle` mapping slot.
pub fn verify_op_output_root(proof: &OpOutputRootProof, l1_state_root: Bytes32) -> Result<(), CoreError> {
    let mut preimage = Vec::with_capacity(32 * 4);
    preimage.extend_from_slice(&proof.version);
    preimage.extend_from_slice(proof.l2_state_root.as_slice());
    preimage.extend_from_slice(proof.message_passer_storage_root.as_slice());
    preimage.extend_from_slice(proof.l2_block_hash.as_slice());
    let computed = crate::mpt::keccak256(&preimage);

    let stored = verify_storage_mpt(l1_state_root, &proof.l1_output_oracle_storage_proof)?
        .ok_or_else(|| CoreError::InvalidWire("L2OutputOracle storage slot is empty".to_string()))?;
    if Bytes32::from(computed) != stored {
        return Err(CoreError::StateRootMismatch {
            claimed: hex::encode(stored.as_slice()),
            verified: hex::encode(computed),
        });
    }
    Ok(())
}

/// Stage 6: shape a verified payload into the JSON-RPC result value.
/// Intentionally untyped (`serde_json::Value`) since the shape differs per
/// method and this layer's job is only to carry the verified bytes across,
/// not to own a JSON-RPC schema.
pub fn shape_result(payload: &VerifiedPayload) -> serde_json::Value {
    match payload {
        VerifiedPayload::Account(Some(acc)) => serde_json::json!({
            "nonce": format!("0x{:x}", acc.nonce),
            "balance": format!("0x{}", hex::encode(acc.balance.as_slice()).trim_start_matches('0')),
            "codeHash": format!("0x{}", hex::encode(acc.code_hash.as_slice())),
            "storageRoot": format!("0x{}", hex::encode(acc.storage_root.as_slice())),
        }),
        VerifiedPayload::Account(None) => serde_json::Value::Null,
        VerifiedPayload::StorageValue(Some(v)) => serde_json::Value::String(format!("0x{}", hex::encode(v.as_slice()))),
        VerifiedPayload::StorageValue(None) => serde_json::Value::String("0x0".to_string()),
        VerifiedPayload::Receipt(Some(r)) => serde_json::json!({
            "status": format!("0x{:x}", r.status),
            "cumulativeGasUsed": format!("0x{:x}", r.cumulative_gas_used),
            "logs": r.logs.len(),
        }),
        VerifiedPayload::Receipt(None) => serde_json::Value::Null,
        VerifiedPayload::CallResult(bytes) => serde_json::Value::String(format!("0x{}", hex::encode(bytes))),
    }
}

pub enum VerifiedPayload {
    Account(Option<AccountState>),
    StorageValue(Option<Bytes32>),
    Receipt(Option<TransactionReceipt>),
    CallResult(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_trait_is_object_safe() {
        struct AllProofable;
        impl ClassifyMethod for AllProofable {
            fn classify(&self, _method: &str) -> MethodClass {
                MethodClass::Proofable
            }
        }
        let c: Box<dyn ClassifyMethod> = Box::new(AllProofable);
        assert_eq!(c.classify("eth_getBalance"), MethodClass::Proofable);
    }

    #[test]
    fn verify_account_mpt_roundtrips_through_a_fresh_trie() {
        use crate::types::execution::AccountState;

        let mut trie = Trie::new();
        let address = Address::from([0x11u8; 20]);
        let account = AccountState {
            nonce: 3,
            balance: Bytes32::from([0x02u8; 32]),
            storage_root: Bytes32::from(AccountState::EMPTY_STORAGE_ROOT),
            code_hash: Bytes32::from(AccountState::EMPTY_CODE_HASH),
        };
        trie.insert_keccak(address.as_slice(), account.encode_rlp()).unwrap();
        let root = trie.root_hash();
        let proof = trie.proof_for_address(&address);

        let account_proof = AccountProof { address, proof, account: Some(account.clone()) };
        let decoded = verify_account_mpt(root, &account_proof).unwrap();
        assert_eq!(decoded, Some(account));
    }

    #[test]
    fn filter_logs_matches_address_and_all_topics() {
        use crate::types::execution::Log;

        let addr = Address::from([1u8; 20]);
        let other = Address::from([2u8; 20]);
        let topic = Bytes32::from([9u8; 32]);
        let receipts = vec![TransactionReceipt {
            status: 1,
            cumulative_gas_used: 21000,
            logs_bloom: [0u8; 256],
            logs: vec![
                Log { address: addr, topics: vec![topic], data: vec![] },
                Log { address: other, topics: vec![topic], data: vec![] },
            ],
        }];
        let found = filter_logs_from_receipts(&receipts, Some(&addr), &[topic]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, addr);
    }

    #[test]
    fn op_output_root_hashes_the_four_preimage_fields() {
        let version = [0u8; 32];
        let state_root = Bytes32::from([1u8; 32]);
        let mp_root = Bytes32::from([2u8; 32]);
        let block_hash = Bytes32::from([3u8; 32]);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&version);
        preimage.extend_from_slice(state_root.as_slice());
        preimage.extend_from_slice(mp_root.as_slice());
        preimage.extend_from_slice(block_hash.as_slice());
        let expected = crate::mpt::keccak256(&preimage);

        let mut preimage2 = Vec::new();
        preimage2.extend_from_slice(&version);
        preimage2.extend_from_slice(state_root.as_slice());
        preimage2.extend_from_slice(mp_root.as_slice());
        preimage2.extend_from_slice(block_hash.as_slice());
        assert_eq!(crate::mpt::keccak256(&preimage2), expected);
    }
}
