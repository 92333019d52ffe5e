//! End-to-end round behaviour against an in-process grid.

mod common;

use common::{grid_of, initial_state, params, two_feature_schema, FixedParticipant};
use fedhpo::federated::{OrchestratorConfig, Participant, RoundOrchestrator, RoundPhase};
use fedhpo::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn config(rounds: u32, timeout: Duration) -> OrchestratorConfig {
    OrchestratorConfig {
        num_rounds: rounds,
        round_timeout: timeout,
        seed: Some(42),
        ..Default::default()
    }
}

#[tokio::test]
async fn identical_updates_keep_parameters_across_rounds() {
    let p = params([0.1, -1.0 / 3.0], 0.7);
    let participants: Vec<Arc<dyn Participant>> = vec![
        Arc::new(FixedParticipant::new("site-1", p.clone(), 10)),
        Arc::new(FixedParticipant::new("site-2", p.clone(), 20)),
        Arc::new(FixedParticipant::new("site-3", p.clone(), 30)),
    ];
    let mut orch = RoundOrchestrator::new(
        grid_of(participants),
        two_feature_schema(),
        initial_state(),
        config(2, Duration::from_secs(5)),
    );

    let summary = assert_ok!(orch.run().await);
    assert_eq!(summary.history.len(), 2);
    assert_eq!(summary.final_state.round, 2);
    assert_eq!(summary.final_state.parameters, p);
    for (i, round) in summary.history.iter().enumerate() {
        assert_eq!(round.round, i as u32 + 1);
        assert_eq!(round.state.parameters, p);
        assert_eq!(round.train_responded, 3);
        assert_eq!(round.eval_responded, 3);
        assert!(round.dropped().is_empty());
        assert_eq!(round.metric("accuracy"), Some(0.5));
    }
}

#[tokio::test]
async fn timed_out_participant_dropped_every_round() {
    let participants: Vec<Arc<dyn Participant>> = vec![
        Arc::new(FixedParticipant::new("site-1", params([1.0, 1.0], 0.0), 10)),
        Arc::new(FixedParticipant::new("site-2", params([3.0, 3.0], 0.0), 10)),
        Arc::new(
            FixedParticipant::new("site-3", params([100.0, 100.0], 0.0), 1000)
                .slow(Duration::from_secs(10)),
        ),
    ];
    let mut orch = RoundOrchestrator::new(
        grid_of(participants),
        two_feature_schema(),
        initial_state(),
        config(2, Duration::from_millis(150)),
    );

    let summary = assert_ok!(orch.run().await);
    assert_eq!(summary.history.len(), 2);
    for round in &summary.history {
        assert_eq!(round.train_sampled, 3);
        assert_eq!(round.train_responded, 2);
        assert_eq!(round.eval_responded, 2);
        assert_eq!(round.dropped_train, vec!["site-3".to_string()]);
        assert_eq!(round.dropped_eval, vec!["site-3".to_string()]);
    }
    // Late reply never applied.
    assert_eq!(summary.final_state.parameters.weights[0], vec![2.0, 2.0]);
}

#[tokio::test]
async fn erroring_participant_counts_as_dropout() {
    let participants: Vec<Arc<dyn Participant>> = vec![
        Arc::new(FixedParticipant::new("site-1", params([1.0, 2.0], 0.5), 10)),
        Arc::new(FixedParticipant::new("site-2", params([9.0, 9.0], 9.0), 10).failing()),
    ];
    let mut orch = RoundOrchestrator::new(
        grid_of(participants),
        two_feature_schema(),
        initial_state(),
        config(1, Duration::from_secs(5)),
    );

    let summary = assert_ok!(orch.run().await);
    let round = &summary.history[0];
    assert_eq!(round.train_responded, 1);
    assert_eq!(round.dropped_train, vec!["site-2".to_string()]);
    assert_eq!(round.dropped_eval, vec!["site-2".to_string()]);
    assert_eq!(round.dropped().len(), 1);
    assert_eq!(summary.final_state.parameters, params([1.0, 2.0], 0.5));
}

#[tokio::test]
async fn all_timeouts_fail_first_round() {
    let participants: Vec<Arc<dyn Participant>> = (1..=3)
        .map(|i| {
            Arc::new(
                FixedParticipant::new(&format!("site-{}", i), params([1.0, 1.0], 0.0), 10)
                    .slow(Duration::from_secs(10)),
            ) as Arc<dyn Participant>
        })
        .collect();
    let mut orch = RoundOrchestrator::new(
        grid_of(participants),
        two_feature_schema(),
        initial_state(),
        config(2, Duration::from_millis(100)),
    );

    let err = assert_err!(orch.run().await);
    assert!(matches!(err, Error::Aggregation(_)));
    assert!(orch.history().is_empty());
    assert_eq!(orch.state(), &initial_state());
    assert_eq!(orch.phase(), RoundPhase::Aggregate);
}

#[tokio::test]
async fn empty_roster_is_aggregation_error() {
    let mut orch = RoundOrchestrator::new(
        grid_of(Vec::new()),
        two_feature_schema(),
        initial_state(),
        config(1, Duration::from_secs(1)),
    );
    assert!(matches!(orch.run().await, Err(Error::Aggregation(_))));
}
