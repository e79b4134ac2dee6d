//! Off-thread simulation.
//!
//! Requests and responses cross the thread boundary as JSON text:
//! `{ "type": "simulate" | "matrix_multiply" | "tensor_product", "id", "data" }` in,
//! `{ "type": "result" | "error", "id", "data" | "error" }` out. The worker thread owns
//! its own engine and caches; nothing is shared with the caller except the cancel set.
use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::error::{SimError, SimResult};
use crate::core::kernel::circuit::{Circuit, InitialState, SimulationOptions, MAX_QUBITS};
use crate::core::kernel::complex::{ComplexMatrix, DEFAULT_TOLERANCE};
use crate::core::kernel::engine::Engine;
use crate::core::kernel::gates::GateRegistry;
use crate::core::sim_cache::{CacheConfig, CacheService};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Simulate,
    MatrixMultiply,
    TensorProduct,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Result,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    fn ok(id: String, data: Value) -> Self {
        Self { kind: ResponseKind::Result, id, data: Some(data), error: None }
    }

    fn err(id: String, error: impl ToString) -> Self {
        Self { kind: ResponseKind::Error, id, data: None, error: Some(error.to_string()) }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResponseKind::Error
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatePayload {
    pub circuit: Circuit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<InitialState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SimulationOptions>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixPair {
    pub a: ComplexMatrix,
    pub b: ComplexMatrix,
}

/// Typed form of a request body.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerOp {
    Simulate(SimulatePayload),
    MatrixMultiply(MatrixPair),
    TensorProduct(MatrixPair),
}

impl WorkerOp {
    pub fn simulate(circuit: Circuit) -> Self {
        WorkerOp::Simulate(SimulatePayload { circuit, initial: None, options: None })
    }

    pub fn into_request(self, id: impl Into<String>) -> SimResult<WorkerRequest> {
        let (kind, data) = match self {
            WorkerOp::Simulate(p) => (RequestKind::Simulate, serde_json::to_value(p)),
            WorkerOp::MatrixMultiply(p) => (RequestKind::MatrixMultiply, serde_json::to_value(p)),
            WorkerOp::TensorProduct(p) => (RequestKind::TensorProduct, serde_json::to_value(p)),
        };
        let data = data.map_err(|e| SimError::Worker(e.to_string()))?;
        Ok(WorkerRequest { kind, id: id.into(), data })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    pub cache: CacheConfig,
    pub tolerance: f64,
    pub max_qubits: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { cache: CacheConfig::default(), tolerance: DEFAULT_TOLERANCE, max_qubits: MAX_QUBITS }
    }
}

/// Execute one request against `engine`/`caches`.
pub fn handle_request(engine: &Engine<'_>, caches: &mut CacheService, req: WorkerRequest) -> WorkerResponse {
    let id = req.id;
    match execute(engine, caches, req.kind, req.data) {
        Ok(data) => WorkerResponse::ok(id, data),
        Err(err) => {
            warn!(id = %id, error = %err, "worker request failed");
            WorkerResponse::err(id, err)
        }
    }
}

fn execute(engine: &Engine<'_>, caches: &mut CacheService, kind: RequestKind, data: Value) -> Result<Value, String> {
    match kind {
        RequestKind::Simulate => {
            let p: SimulatePayload = parse_data(data)?;
            let options = p.options.unwrap_or_default();
            let result = engine.simulate_cached(&p.circuit, p.initial.as_ref(), &options, caches);
            match &result.error {
                Some(err) => Err(err.clone()),
                None => to_value(result.as_ref()),
            }
        }
        RequestKind::MatrixMultiply => {
            let p: MatrixPair = parse_data(data)?;
            let product = p.a.mul(&p.b).map_err(|e| e.to_string())?;
            to_value(&product)
        }
        RequestKind::TensorProduct => {
            let p: MatrixPair = parse_data(data)?;
            to_value(&p.a.kron(&p.b))
        }
    }
}

/// Decode, execute and re-encode one message. Undecodable input yields an error
/// response with an empty id.
pub fn handle_message(engine: &Engine<'_>, caches: &mut CacheService, raw: &str) -> String {
    let response = match serde_json::from_str::<WorkerRequest>(raw) {
        Ok(req) => handle_request(engine, caches, req),
        Err(e) => WorkerResponse::err(String::new(), format!("malformed request: {e}")),
    };
    serde_json::to_string(&response)
        .unwrap_or_else(|e| format!(r#"{{"type":"error","id":{:?},"error":"encode failed: {e}"}}"#, response.id))
}

fn parse_data<T: for<'de> Deserialize<'de>>(data: Value) -> Result<T, String> {
    serde_json::from_value(data).map_err(|e| format!("bad request data: {e}"))
}

fn to_value<T: Serialize>(v: &T) -> Result<Value, String> {
    serde_json::to_value(v).map_err(|e| format!("encode failed: {e}"))
}

type CancelSet = Arc<Mutex<HashSet<String>>>;

/// Consume a cancellation; each cancelled id is either skipped by the worker or
/// has its response dropped, never both.
fn take_cancelled(set: &CancelSet, id: &str) -> bool {
    set.lock().map(|mut s| s.remove(id)).unwrap_or(false)
}

pub struct Worker {
    tx: Option<Sender<String>>,
    rx: Receiver<String>,
    cancelled: CancelSet,
    next_id: u64,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(config: WorkerConfig) -> SimResult<Self> {
        let (req_tx, req_rx) = mpsc::channel::<String>();
        let (resp_tx, resp_rx) = mpsc::channel::<String>();
        let cancelled: CancelSet = Arc::new(Mutex::new(HashSet::new()));
        let cancel_view = Arc::clone(&cancelled);

        let handle = thread::Builder::new()
            .name("qsim-worker".into())
            .spawn(move || {
                let engine = Engine::new(GateRegistry::shared())
                    .with_tolerance(config.tolerance)
                    .with_max_qubits(config.max_qubits);
                let mut caches = CacheService::new(config.cache);
                info!("worker started");
                for raw in req_rx {
                    let id = serde_json::from_str::<WorkerRequest>(&raw).map(|r| r.id).ok();
                    if id.as_deref().is_some_and(|id| take_cancelled(&cancel_view, id)) {
                        debug!(?id, "skipping cancelled request");
                        continue;
                    }
                    let out = handle_message(&engine, &mut caches, &raw);
                    if resp_tx.send(out).is_err() {
                        break;
                    }
                }
                info!("worker stopped");
            })
            .map_err(|e| SimError::Worker(format!("spawn failed: {e}")))?;

        Ok(Self { tx: Some(req_tx), rx: resp_rx, cancelled, next_id: 1, handle: Some(handle) })
    }

    /// Queue an operation; returns the id its response will carry.
    pub fn submit(&mut self, op: WorkerOp) -> SimResult<String> {
        let id = format!("req-{}", self.next_id);
        self.next_id += 1;
        let req = op.into_request(id.clone())?;
        let raw = serde_json::to_string(&req).map_err(|e| SimError::Worker(e.to_string()))?;
        self.submit_raw(raw)?;
        Ok(id)
    }

    /// Queue an already-encoded message.
    pub fn submit_raw(&self, raw: String) -> SimResult<()> {
        let tx = self.tx.as_ref().ok_or_else(|| SimError::Worker("worker is shut down".into()))?;
        tx.send(raw).map_err(|_| SimError::Worker("worker thread has exited".into()))
    }

    /// The response for `id`, if any, is discarded. A request still queued is skipped.
    /// Only ids still in flight should be cancelled; an id whose response was already
    /// received stays pending.
    pub fn cancel(&self, id: &str) {
        if let Ok(mut set) = self.cancelled.lock() {
            set.insert(id.to_string());
        }
    }

    /// Cancellations not yet matched to a skipped request or dropped response.
    pub fn pending_cancellations(&self) -> usize {
        self.cancelled.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Next response for a non-cancelled request, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerResponse> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let raw = match self.rx.recv_timeout(left) {
                Ok(raw) => raw,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => return None,
            };
            match serde_json::from_str::<WorkerResponse>(&raw) {
                Ok(resp) if take_cancelled(&self.cancelled, &resp.id) => {
                    debug!(id = %resp.id, "dropping response for cancelled request");
                }
                Ok(resp) => return Some(resp),
                Err(e) => warn!(error = %e, "undecodable worker response"),
            }
        }
    }

    /// Close the request channel and wait for the thread to drain it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn request_wire_shape() {
        let req = WorkerOp::simulate(Circuit::bell()).into_request("r3").unwrap();
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "simulate");
        assert_eq!(json["id"], "r3");
        assert_eq!(json["data"]["circuit"]["numQubits"], 2);
    }

    #[test]
    fn malformed_message_gets_error_response() {
        let engine = Engine::new(GateRegistry::shared());
        let mut caches = CacheService::default();
        let out = handle_message(&engine, &mut caches, "{not json");
        let resp: WorkerResponse = serde_json::from_str(&out).unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.id, "");

        let out = handle_message(&engine, &mut caches, r#"{"type":"simulate","id":"9","data":{}}"#);
        let resp: WorkerResponse = serde_json::from_str(&out).unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.id, "9");
    }

    #[test]
    fn worker_round_trip() {
        let mut worker = Worker::spawn(WorkerConfig::default()).unwrap();
        let id = worker.submit(WorkerOp::simulate(Circuit::bell())).unwrap();
        let resp = worker.recv_timeout(WAIT).expect("response");
        assert_eq!(resp.id, id);
        assert!(!resp.is_error());
        let probs = &resp.data.unwrap()["probabilities"];
        assert!((probs[0].as_f64().unwrap() - 0.5).abs() < 1e-9);
        worker.shutdown();
    }

    #[test]
    fn matrix_ops() {
        let mut worker = Worker::spawn(WorkerConfig::default()).unwrap();
        let pair = MatrixPair { a: ComplexMatrix::identity(2), b: ComplexMatrix::identity(3) };
        worker.submit(WorkerOp::TensorProduct(pair.clone())).unwrap();
        let resp = worker.recv_timeout(WAIT).unwrap();
        let m: ComplexMatrix = serde_json::from_value(resp.data.unwrap()).unwrap();
        assert_eq!(m.nrows(), 6);

        worker.submit(WorkerOp::MatrixMultiply(pair)).unwrap();
        let resp = worker.recv_timeout(WAIT).unwrap();
        assert!(resp.is_error());
    }

    #[test]
    fn cancelled_responses_are_dropped() {
        let mut worker = Worker::spawn(WorkerConfig::default()).unwrap();
        let first = worker.submit(WorkerOp::simulate(Circuit::ghz(3))).unwrap();
        worker.cancel(&first);
        let second = worker.submit(WorkerOp::simulate(Circuit::bell())).unwrap();
        let resp = worker.recv_timeout(WAIT).unwrap();
        assert_eq!(resp.id, second);
        assert!(worker.recv_timeout(Duration::from_millis(50)).is_none());
    }

    #[test]
    fn cancellations_are_consumed() {
        let mut worker = Worker::spawn(WorkerConfig::default()).unwrap();
        for _ in 0..3 {
            let doomed = worker.submit(WorkerOp::simulate(Circuit::ghz(3))).unwrap();
            worker.cancel(&doomed);
            let kept = worker.submit(WorkerOp::simulate(Circuit::bell())).unwrap();
            assert_eq!(worker.recv_timeout(WAIT).unwrap().id, kept);
            assert_eq!(worker.pending_cancellations(), 0);
        }
    }
}
