//! Invariants over random operation sequences.

use std::collections::HashMap;
use std::time::Duration;

use chrono::TimeDelta;
use proptest::prelude::*;
use vetted_config::ProofConfig;
use vetted_core::{ChallengeSpec, ManualClock, NodeSpec, ProofService, State};
use vetted_types::{ChallengeTarget, Event, NodeId, Severity};

use crate::common::proof_with;

const AGENTS: [&str; 2] = ["ada", "bob"];
const MAX_DEPTH: u32 = 4;

#[derive(Debug, Clone)]
enum Op {
    Claim { node: usize, agent: usize, minutes: u8 },
    Refine { parent: usize, agent: usize, dependency: Option<usize> },
    Accept { node: usize },
    Refute { node: usize },
    Challenge { node: usize, severity: usize },
    Resolve { challenge: usize },
    Wait { minutes: u8 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), 0..AGENTS.len(), 1..=90u8)
            .prop_map(|(node, agent, minutes)| Op::Claim { node, agent, minutes }),
        (any::<usize>(), 0..AGENTS.len(), proptest::option::of(any::<usize>())).prop_map(
            |(parent, agent, dependency)| Op::Refine {
                parent,
                agent,
                dependency,
            }
        ),
        any::<usize>().prop_map(|node| Op::Accept { node }),
        any::<usize>().prop_map(|node| Op::Refute { node }),
        (any::<usize>(), 0..Severity::ALL.len())
            .prop_map(|(node, severity)| Op::Challenge { node, severity }),
        any::<usize>().prop_map(|challenge| Op::Resolve { challenge }),
        (1..=120u8).prop_map(|minutes| Op::Wait { minutes }),
    ]
}

fn pick(state: &State, index: usize) -> String {
    let nodes = state.all_nodes();
    nodes[index % nodes.len()].id.to_string()
}

fn run(proof: &mut ProofService<ManualClock>, clock: &ManualClock, op: &Op, issued: &mut usize) {
    let state = proof.load_state().unwrap();
    let before = proof.events_since(0).unwrap().len();

    let result = match op {
        Op::Claim {
            node,
            agent,
            minutes,
        } => proof
            .claim_node(
                &pick(&state, *node),
                AGENTS[*agent],
                Some(Duration::from_secs(u64::from(*minutes) * 60)),
            )
            .map(drop),
        Op::Refine {
            parent,
            agent,
            dependency,
        } => {
            let mut spec = NodeSpec::claim("step");
            if let Some(dep) = dependency {
                spec = spec.requires_validated(pick(&state, *dep));
            }
            proof
                .refine_node(&pick(&state, *parent), AGENTS[*agent], &spec)
                .map(drop)
        }
        Op::Accept { node } => proof.accept_node(&pick(&state, *node)).map(drop),
        Op::Refute { node } => proof.refute_node(&pick(&state, *node)),
        Op::Challenge { node, severity } => {
            *issued += 1;
            proof
                .raise_challenge(&ChallengeSpec::new(
                    format!("c{issued}"),
                    pick(&state, *node),
                    ChallengeTarget::Statement,
                    Severity::ALL[*severity],
                    "objection",
                ))
                .map(drop)
        }
        Op::Resolve { challenge } => {
            let challenges = state.challenges();
            if challenges.is_empty() {
                Ok(())
            } else {
                let id = challenges[challenge % challenges.len()].id.to_string();
                proof.resolve_challenge(&id, None)
            }
        }
        Op::Wait { minutes } => {
            clock.advance(TimeDelta::minutes(i64::from(*minutes)));
            Ok(())
        }
    };

    let after = proof.events_since(0).unwrap().len();
    assert!(after >= before, "ledger shrank from {before} to {after}");
    if let Err(err) = result {
        assert!(!err.is_corruption(), "{err}");
        assert_eq!(after, before, "failed operation appended events: {err}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_histories_keep_invariants(ops in proptest::collection::vec(op(), 1..40)) {
        let config = ProofConfig {
            max_depth: MAX_DEPTH,
            warn_depth: 2,
            ..ProofConfig::default()
        };
        let (mut proof, clock) = proof_with(config);
        let mut issued = 0;
        for op in &ops {
            run(&mut proof, &clock, op, &mut issued);
        }

        let events: Vec<Event> = proof
            .events_since(0)
            .unwrap()
            .into_iter()
            .map(|entry| entry.event)
            .collect();

        // Determinism: replay is a pure function of the ledger.
        let once = State::replay(&events).unwrap();
        let twice = State::replay(&events).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(&once, &*proof.load_state().unwrap());

        // Terminal: at most one terminal transition per node.
        let mut terminal: HashMap<NodeId, usize> = HashMap::new();
        for event in &events {
            if let Event::NodeValidated { id, .. } | Event::NodeRefuted { id, .. } = event {
                *terminal.entry(id.clone()).or_default() += 1;
            }
        }
        prop_assert!(terminal.values().all(|&count| count == 1));

        // Depth: nothing deeper than the configured maximum.
        prop_assert!(
            once.all_nodes()
                .iter()
                .all(|node| node.id.depth() <= MAX_DEPTH as usize)
        );
    }
}
