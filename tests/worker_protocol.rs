use std::time::Duration;

use qsim_kernel::core::kernel::{Circuit, GateInstance};
use qsim_kernel::core::worker::{ResponseKind, SimulatePayload, Worker, WorkerConfig, WorkerOp, WorkerResponse};
use qsim_kernel::SimulationResult;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn simulate_over_json_messages() {
    let worker = Worker::spawn(WorkerConfig::default()).unwrap();
    let msg = r#"{
        "type": "simulate",
        "id": "job-41",
        "data": { "circuit": { "numQubits": 1, "gates": [ { "name": "X", "qubits": [0] } ] } }
    }"#;
    worker.submit_raw(msg.to_string()).unwrap();
    let resp = worker.recv_timeout(WAIT).expect("response");
    assert_eq!(resp.kind, ResponseKind::Result);
    assert_eq!(resp.id, "job-41");
    let result: SimulationResult = serde_json::from_value(resp.data.unwrap()).unwrap();
    assert!((result.probabilities[1] - 1.0).abs() < 1e-12);
    assert_eq!(result.reduced_states.len(), 1);
    worker.shutdown();
}

#[test]
fn warnings_travel_with_the_result() {
    let mut worker = Worker::spawn(WorkerConfig::default()).unwrap();
    let circuit = Circuit::new(1).push(GateInstance::new("NOPE", vec![0]));
    let id = worker
        .submit(WorkerOp::Simulate(SimulatePayload { circuit, initial: None, options: None }))
        .unwrap();
    let resp = worker.recv_timeout(WAIT).unwrap();
    assert_eq!(resp.id, id);
    let result: SimulationResult = serde_json::from_value(resp.data.unwrap()).unwrap();
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].gate, "NOPE");
}

#[test]
fn circuit_errors_become_error_responses() {
    let mut worker = Worker::spawn(WorkerConfig { max_qubits: 2, ..WorkerConfig::default() }).unwrap();
    let id = worker.submit(WorkerOp::simulate(Circuit::ghz(3))).unwrap();
    let resp: WorkerResponse = worker.recv_timeout(WAIT).unwrap();
    assert_eq!(resp.id, id);
    assert!(resp.is_error());
    assert!(resp.error.unwrap().contains("configured limit"));
}

// A single worker thread drains one channel, so this transport answers in order.
// The message contract itself does not promise ordering; callers match on `id`.
#[test]
fn in_process_transport_answers_in_submission_order() {
    let mut worker = Worker::spawn(WorkerConfig::default()).unwrap();
    let ids: Vec<String> = (0..4)
        .map(|_| worker.submit(WorkerOp::simulate(Circuit::bell())).unwrap())
        .collect();
    let got: Vec<String> = (0..4).map(|_| worker.recv_timeout(WAIT).unwrap().id).collect();
    assert_eq!(ids, got);
}
