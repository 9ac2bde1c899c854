//! Batches either commit every event or none.

use vetted_core::{ChallengeSpec, NodeSpec, ProofError};
use vetted_types::{ChallengeTarget, EpistemicState, NodeId, Severity};

use crate::common::{PROVER, proof, refined};

fn id(text: &str) -> NodeId {
    NodeId::parse(text).unwrap()
}

#[test]
fn refine_bulk_numbers_children_in_order() {
    let (mut proof, _clock) = proof();
    proof.claim_node("1", PROVER, None).unwrap();
    let created = proof
        .refine_node_bulk(
            "1",
            PROVER,
            &[
                NodeSpec::claim("A"),
                NodeSpec::claim("B").depends_on("1.1"),
                NodeSpec::claim("C").requires_validated("1.2"),
            ],
        )
        .unwrap();
    let ids: Vec<String> = created.iter().map(|c| c.id.to_string()).collect();
    assert_eq!(ids, ["1.1", "1.2", "1.3"]);

    let entries = proof.events_since(0).unwrap();
    let seqs: Vec<u64> = entries.iter().rev().take(3).map(|e| e.seq).collect();
    assert_eq!(seqs, [5, 4, 3]);
}

#[test]
fn failed_refine_bulk_leaves_state_identical() {
    let (mut proof, _clock) = proof();
    proof.claim_node("1", PROVER, None).unwrap();
    let before = proof.load_state().unwrap();
    let entries_before = proof.events_since(0).unwrap().len();

    let err = proof
        .refine_node_bulk(
            "1",
            PROVER,
            &[
                NodeSpec::claim("A"),
                NodeSpec::claim("B"),
                NodeSpec::claim("C").requires_validated("1.9"),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, ProofError::BatchItem { index: 2, .. }), "{err:?}");

    assert_eq!(proof.events_since(0).unwrap().len(), entries_before);
    assert_eq!(*proof.load_state().unwrap(), *before);
}

#[test]
fn malformed_spec_fails_the_batch_before_the_ledger() {
    let (mut proof, _clock) = proof();
    proof.claim_node("1", PROVER, None).unwrap();
    let err = proof
        .refine_node_bulk(
            "1",
            PROVER,
            &[NodeSpec::claim("A"), NodeSpec::claim("B").depends_on("x.1")],
        )
        .unwrap_err();
    assert!(matches!(err, ProofError::BatchItem { index: 1, .. }));
    assert!(matches!(err.root_item(), ProofError::InvalidNodeId(_)));
}

#[test]
fn accept_bulk_sees_earlier_items() {
    let (mut proof, _clock) = proof();
    proof.claim_node("1", PROVER, None).unwrap();
    proof
        .refine_node_bulk(
            "1",
            PROVER,
            &[
                NodeSpec::claim("A"),
                NodeSpec::claim("B"),
                NodeSpec::claim("C").requires_validated("1.1"),
            ],
        )
        .unwrap();

    let accepted = proof.accept_node_bulk(&["1.1", "1.3"]).unwrap();
    assert_eq!(accepted.len(), 2);
    let state = proof.load_state().unwrap();
    assert_eq!(state.get_node(&id("1.3")).unwrap().state, EpistemicState::Validated);
    assert_eq!(state.get_node(&id("1.2")).unwrap().state, EpistemicState::Pending);
}

#[test]
fn accept_bulk_in_reverse_order_fails_atomically() {
    let (mut proof, _clock) = proof();
    proof.claim_node("1", PROVER, None).unwrap();
    proof
        .refine_node_bulk(
            "1",
            PROVER,
            &[
                NodeSpec::claim("A"),
                NodeSpec::claim("B").requires_validated("1.1"),
            ],
        )
        .unwrap();
    let before = proof.load_state().unwrap();

    let err = proof.accept_node_bulk(&["1.2", "1.1"]).unwrap_err();
    assert!(matches!(err, ProofError::BatchItem { index: 0, .. }));
    assert!(matches!(
        err.root_item(),
        ProofError::AcceptanceBlocked { unvalidated, .. } if unvalidated == &[id("1.1")]
    ));

    let after = proof.load_state().unwrap();
    assert_eq!(*after, *before);
    assert_eq!(after.get_node(&id("1.1")).unwrap().state, EpistemicState::Pending);
}

#[test]
fn one_blocked_node_stops_the_whole_acceptance_batch() {
    let (mut proof, _clock) = refined(&["A", "B", "C"]);
    proof
        .raise_challenge(&ChallengeSpec::new(
            "c1",
            "1.3",
            ChallengeTarget::Inference,
            Severity::Major,
            "non sequitur",
        ))
        .unwrap();
    let entries_before = proof.events_since(0).unwrap().len();

    let err = proof.accept_node_bulk(&["1.1", "1.2", "1.3"]).unwrap_err();
    assert!(matches!(err, ProofError::BatchItem { index: 2, .. }));
    assert_eq!(proof.events_since(0).unwrap().len(), entries_before);

    let state = proof.load_state().unwrap();
    assert!(
        state
            .all_nodes()
            .iter()
            .all(|node| node.state == EpistemicState::Pending)
    );
}

#[test]
fn empty_batches_are_format_errors() {
    let (mut proof, _clock) = proof();
    proof.claim_node("1", PROVER, None).unwrap();
    assert!(matches!(
        proof.refine_node_bulk("1", PROVER, &[]).unwrap_err(),
        ProofError::EmptyBatch
    ));
    assert!(matches!(
        proof.accept_node_bulk(&[]).unwrap_err(),
        ProofError::EmptyBatch
    ));
}
