//! Coroutine-style request state machine (§4.6, §5).
//!
//! New relative to the teacher, which has no suspension model at all —
//! `lumen-wasm` drives real `async fn`s against the browser's `fetch`,
//! which only works because it has an executor (the browser's event loop)
//! to suspend into. This core has to stay usable from a non-async
//! embedder, so suspension is represented explicitly: a stage that's
//! missing data registers a [`DataRequest`] and returns
//! `Err(CoreError::Pending)` rather than `.await`ing anything.

use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// Where a data request is fetched from (§6 "External interfaces").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    BeaconApi,
    Rpc,
    Checkpointz,
    Proofer,
    Intern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Ssz,
}

/// One outstanding (or resolved) external fetch. `id` is the SHA-256 of
/// `method || url_or_payload`, which is what `VerifyState::add_request`
/// dedups on rather than object identity or arrival order.
#[derive(Clone, Debug)]
pub struct DataRequest {
    pub id: [u8; 32],
    pub url_or_payload: Vec<u8>,
    pub method: String,
    pub encoding: Encoding,
    pub kind: RequestKind,
    pub response: Option<Vec<u8>>,
    pub error: Option<String>,
    pub retries: u8,
}

impl DataRequest {
    pub fn new(kind: RequestKind, method: impl Into<String>, encoding: Encoding, url_or_payload: Vec<u8>) -> Self {
        let method = method.into();
        let mut hasher = Sha256::new();
        hasher.update(method.as_bytes());
        hasher.update(&url_or_payload);
        let id: [u8; 32] = hasher.finalize().into();
        DataRequest { id, url_or_payload, method, encoding, kind, response: None, error: None, retries: 0 }
    }

    pub fn is_resolved(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }

    /// Clear a failed request's terminal state and bump its retry count,
    /// so the outer transport can reissue it against a different upstream
    /// (§4.6 "Retries"). Returns `false` once `retry_cap` is hit, at which
    /// point the caller should surface the error instead.
    pub fn mark_for_retry(&mut self, retry_cap: u8) -> bool {
        if self.retries >= retry_cap {
            return false;
        }
        self.retries += 1;
        self.response = None;
        self.error = None;
        true
    }
}

/// Owns every in-flight and resolved request for one verification context.
/// The caller that handed a request over never frees it itself — matching
/// §3's lifecycle note that request/response memory belongs to the
/// enclosing state object, freed only when the state is freed.
#[derive(Default)]
pub struct VerifyState {
    requests: Vec<DataRequest>,
    pub being_closed: bool,
    pub deadline: Option<std::time::Instant>,
}

impl VerifyState {
    pub fn new() -> Self {
        VerifyState::default()
    }

    /// Register a request, deduped by id. Returns the id either way, so a
    /// stage can immediately look up the (possibly pre-existing) request's
    /// resolution state.
    pub fn add_request(&mut self, request: DataRequest) -> [u8; 32] {
        let id = request.id;
        if !self.requests.iter().any(|r| r.id == id) {
            self.requests.push(request);
        }
        id
    }

    pub fn get_request_by_id(&self, id: &[u8; 32]) -> Option<&DataRequest> {
        self.requests.iter().find(|r| &r.id == id)
    }

    pub fn get_request_by_id_mut(&mut self, id: &[u8; 32]) -> Option<&mut DataRequest> {
        self.requests.iter_mut().find(|r| &r.id == id)
    }

    pub fn get_request_by_url(&self, url: &[u8]) -> Option<&DataRequest> {
        self.requests.iter().find(|r| r.url_or_payload == url)
    }

    pub fn pending_requests(&self) -> Vec<&DataRequest> {
        self.requests.iter().filter(|r| !r.is_resolved()).collect()
    }

    pub fn has_pending(&self) -> bool {
        self.requests.iter().any(|r| !r.is_resolved())
    }

    /// Resolved requests in LIFO order — most recently registered first —
    /// the consumption order §4.6 guarantees on resumption. External
    /// arrival order of the underlying fetches is not observable here:
    /// each request is addressed by its id, not by when its response
    /// landed.
    pub fn resolved_lifo(&self) -> impl Iterator<Item = &DataRequest> {
        self.requests.iter().rev().filter(|r| r.is_resolved())
    }

    pub fn requests_to_retry(&mut self, retry_cap: u8) -> Vec<[u8; 32]> {
        self.requests
            .iter_mut()
            .filter(|r| r.error.is_some())
            .filter_map(|r| if r.mark_for_retry(retry_cap) { Some(r.id) } else { None })
            .collect()
    }
}

/// Per-request verification context threaded through every pipeline stage.
pub struct VerifyCtx {
    pub chain_id: u64,
    pub args: Vec<u8>,
    pub expected_slot: Option<u64>,
    /// Accumulated, newline-joined diagnostic trail — not the terminal
    /// error itself (that's the `Result`'s `Err`), but context a caller
    /// can log alongside it.
    pub error: String,
    pub state: VerifyState,
    /// Set by a stage whose remaining work is CPU-bound proof packaging
    /// that should run off the main loop. This is an ownership hand-off
    /// contract (§5), not shared mutable state: once set, the main thread
    /// must not touch `self` again until a [`WorkerHandoff`] hands it back.
    pub worker_required: bool,
}

impl VerifyCtx {
    pub fn new(chain_id: u64, args: Vec<u8>) -> Self {
        VerifyCtx {
            chain_id,
            args,
            expected_slot: None,
            error: String::new(),
            state: VerifyState::new(),
            worker_required: false,
        }
    }

    pub fn push_error(&mut self, message: impl AsRef<str>) {
        if !self.error.is_empty() {
            self.error.push('\n');
        }
        self.error.push_str(message.as_ref());
    }

    pub fn require_worker(&mut self) {
        self.worker_required = true;
    }
}

/// Marker proving a `VerifyCtx` was handed off to a worker thread and is
/// being handed back. Carries no data — the contract is the hand-off
/// itself (§5: "the main thread owns the context until worker queueing;
/// the worker owns it until the completion callback re-enters the executor
/// on the main loop"), not a payload this type would need to transport.
pub struct WorkerHandoff;

impl WorkerHandoff {
    /// Complete the hand-off: the caller asserts the worker's CPU-bound
    /// work is finished and the main loop may resume driving `ctx`.
    pub fn complete(self, ctx: &mut VerifyCtx) {
        ctx.worker_required = false;
    }
}

pub type StageResult<T> = Result<T, CoreError>;

/// Drive one stage function to completion, suspension, or failure.
///
/// `CoreError::Pending` is not a failure (§7): it means the stage already
/// registered the requests it's missing on `ctx.state`, and the caller
/// (the embedder's I/O loop) must fetch them and call `resume` again.
/// Every other `Err` is terminal for this invocation; an `Upstream` error
/// is additionally recorded on `ctx.error` so a later retry has context.
pub fn resume<T>(ctx: &mut VerifyCtx, stage_fn: impl FnOnce(&mut VerifyCtx) -> StageResult<T>) -> StageResult<T> {
    match stage_fn(ctx) {
        Err(CoreError::Pending) => Err(CoreError::Pending),
        Err(CoreError::Upstream(message)) => {
            ctx.push_error(format!("upstream error: {message}"));
            Err(CoreError::Upstream(message))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_request_dedups_by_id() {
        let mut state = VerifyState::new();
        let a = DataRequest::new(RequestKind::Rpc, "eth_getProof", Encoding::Json, b"payload".to_vec());
        let b = DataRequest::new(RequestKind::Rpc, "eth_getProof", Encoding::Json, b"payload".to_vec());
        let id_a = state.add_request(a);
        let id_b = state.add_request(b);
        assert_eq!(id_a, id_b);
        assert_eq!(state.pending_requests().len(), 1);
    }

    #[test]
    fn resolved_lifo_orders_most_recent_first() {
        let mut state = VerifyState::new();
        let mut first = DataRequest::new(RequestKind::BeaconApi, "a", Encoding::Ssz, b"1".to_vec());
        first.response = Some(vec![1]);
        let mut second = DataRequest::new(RequestKind::BeaconApi, "b", Encoding::Ssz, b"2".to_vec());
        second.response = Some(vec![2]);
        state.add_request(first);
        state.add_request(second);
        let order: Vec<&str> = state.resolved_lifo().map(|r| r.method.as_str()).collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn mark_for_retry_respects_cap() {
        let mut req = DataRequest::new(RequestKind::Proofer, "x", Encoding::Json, vec![]);
        req.error = Some("timeout".to_string());
        assert!(req.mark_for_retry(1));
        req.error = Some("timeout again".to_string());
        assert!(!req.mark_for_retry(1));
    }

    #[test]
    fn resume_surfaces_pending_without_treating_it_as_terminal_error() {
        let mut ctx = VerifyCtx::new(1, vec![]);
        let result: StageResult<()> = resume(&mut ctx, |ctx| {
            ctx.state.add_request(DataRequest::new(RequestKind::Rpc, "eth_getBalance", Encoding::Json, vec![]));
            Err(CoreError::Pending)
        });
        assert!(matches!(result, Err(CoreError::Pending)));
        assert_eq!(ctx.state.pending_requests().len(), 1);
    }

    #[test]
    fn resume_records_upstream_errors_on_ctx() {
        let mut ctx = VerifyCtx::new(1, vec![]);
        let _ = resume(&mut ctx, |_ctx| -> StageResult<()> { Err(CoreError::Upstream("connection reset".to_string())) });
        assert!(ctx.error.contains("connection reset"));
    }
}
