//! Whole-group scenarios over the hand-pumped mock network.

use px_data::{Payload, PaxosMsg};

use super::mocker::*;

fn started(n: usize) -> MockGroup {
    init_logger();
    let mut group = MockGroup::new(n);
    group.deliver_all();
    group
}

#[test]
fn test_default_leader_elected_on_start() {
    let group = started(3);
    assert!(group.nodes[2].leader_role().is_elected());
    assert!(!group.nodes[0].leader_role().is_elected());
    for node in group.nodes.iter() {
        let snap = node.snapshot();
        assert_eq!(snap.view_number, 5);
        assert_eq!(snap.leader, member(2));
    }
    assert_eq!(group.nodes[2].leader_role().in_flight(), 0);
}

#[test]
fn test_election_survives_lost_view_accepted() {
    init_logger();
    let mut group = MockGroup::new(3);
    let mut dropped_from_0 = false;
    group.set_drop_rule(move |from, _, msg| match msg {
        PaxosMsg::ViewAccepted { .. } if from == 1 => true,
        PaxosMsg::ViewAccepted { .. } if from == 0 && !dropped_from_0 => {
            dropped_from_0 = true;
            true
        }
        _ => false,
    });
    group.deliver_all();
    assert!(!group.nodes[2].leader_role().is_elected());

    // the resent NewView gets a second answer from member 0
    group.run_for(1500);
    assert!(group.nodes[2].leader_role().is_elected());
    assert_eq!(group.nodes[2].leader_role().view_number(), 5);

    group.broadcast(0, Payload::app("x"), 1);
    for i in 0..3 {
        assert_eq!(group.delivered(i), vec![(1, Payload::app("x"))]);
    }
}

#[test]
fn test_broadcast_from_follower() {
    let mut group = started(3);
    group.broadcast(0, Payload::app("x"), 1);
    for i in 0..3 {
        assert_eq!(group.delivered(i), vec![(1, Payload::app("x"))]);
        assert_eq!(group.unblocked(i), vec![1]);
    }
    // every round finished once all members acknowledged
    assert_eq!(group.nodes[2].leader_role().in_flight(), 0);
}

#[test]
fn test_total_order() {
    let mut group = started(5);
    let ids = [1u64, 1_000_001, 2_000_001, 3_000_001, 4_000_001];
    for (i, id) in ids.iter().enumerate() {
        group.nodes[i].forward_broadcast(Payload::app(format!("from {}", i)), *id);
    }
    group.deliver_all();

    let first = group.delivered(0);
    assert_eq!(first.len(), 5);
    for (k, (seq_no, _)) in first.iter().enumerate() {
        assert_eq!(*seq_no, k as u64 + 1);
    }
    for i in 1..5 {
        assert_eq!(group.delivered(i), first);
    }
}

#[test]
fn test_retried_broadcast_ordered_once() {
    let mut group = started(3);
    // in flight
    group.nodes[0].forward_broadcast(Payload::app("x"), 1);
    group.nodes[0].forward_broadcast(Payload::app("x"), 1);
    group.deliver_all();
    // already committed
    group.broadcast(0, Payload::app("x"), 1);

    assert_eq!(group.delivered(1), vec![(1, Payload::app("x"))]);
    assert_eq!(group.nodes[2].leader_role().seq_no(), 1);
}

#[test]
fn test_failover_and_step_down() {
    let mut group = started(3);
    group.broadcast(0, Payload::app("a"), 1);

    group.crash(2);
    group.run_for(4000);
    assert!(group.nodes[1].leader_role().is_elected());
    assert_eq!(group.nodes[1].leader_role().view_number(), 7);
    assert_eq!(group.nodes[0].snapshot().leader, member(1));
    assert!(!group.nodes[0].snapshot().alive.contains(&member(2)));

    group.broadcast(0, Payload::app("b"), 2);
    let expected = vec![(1, Payload::app("a")), (2, Payload::app("b"))];
    assert_eq!(group.delivered(0), expected);
    assert_eq!(group.delivered(1), expected);

    // The old leader learns the newer view from resends and catches up.
    group.recover(2);
    group.run_for(2500);
    assert!(!group.nodes[2].leader_role().is_elected());
    assert_eq!(group.nodes[2].snapshot().leader, member(1));
    assert_eq!(group.delivered(2), expected);
}

#[test]
fn test_minority_accept_redriven() {
    let mut group = started(3);
    group.set_drop_rule(|from, to, msg| match msg {
        PaxosMsg::Accept { .. } => from == 2 && to == 0,
        PaxosMsg::Accepted { .. } => from == 1 && to == 2,
        _ => false,
    });
    group.broadcast(2, Payload::app("v"), 2_000_001);
    assert!(group.delivered(1).is_empty());

    group.crash(2);
    group.clear_drop_rule();
    group.run_for(4000);

    assert_eq!(group.delivered(0), vec![(1, Payload::app("v"))]);
    assert_eq!(group.delivered(1), vec![(1, Payload::app("v"))]);
    assert!(group.unblocked(0).contains(&2_000_001));
}

#[test]
fn test_gap_filled_with_no_op() {
    let mut group = started(3);
    group.crash(2);
    // member 1 alone saw slot 2 of the old leader
    group.nodes[1].process(&PaxosMsg::Accept {
        view_no: 5,
        seq_no: 2,
        message: Payload::app("late"),
        msg_id: 2_000_007,
        sender: member(2),
    });
    group.run_for(4000);

    let expected = vec![(1, Payload::NoOp), (2, Payload::app("late"))];
    assert_eq!(group.delivered(0), expected);
    assert_eq!(group.delivered(1), expected);
    assert_eq!(group.nodes[1].leader_role().seq_no(), 2);
    assert!(!group.unblocked(0).contains(&0));

    // new slots continue after the recovered ones
    group.broadcast(0, Payload::app("next"), 3);
    assert_eq!(group.delivered(0).last(), Some(&(3, Payload::app("next"))));
}

#[test]
fn test_missing_success_replayed() {
    let mut group = started(3);
    let mut dropped = false;
    group.set_drop_rule(move |from, to, msg| {
        if !dropped && from == 2 && to == 0 && matches!(msg, PaxosMsg::Success { .. }) {
            dropped = true;
            return true;
        }
        false
    });

    group.broadcast(1, Payload::app("a"), 1_000_001);
    assert!(group.delivered(0).is_empty());
    assert_eq!(group.delivered(1).len(), 1);

    group.broadcast(1, Payload::app("b"), 1_000_002);
    assert_eq!(
        group.delivered(0),
        vec![(1, Payload::app("a")), (2, Payload::app("b"))]
    );
}

#[test]
fn test_abort_retires_round() {
    let mut group = started(3);
    for i in 0..2 {
        group.nodes[i].process(&PaxosMsg::NewView {
            leader: member(1),
            view_number: 7,
        });
    }
    group.deliver_all();

    group.broadcast(2, Payload::app("x"), 2_000_001);
    let leader = group.nodes[2].leader_role();
    assert_eq!(leader.in_flight(), 0);
    assert!(leader.proposal(1).is_none());
    assert!(group.delivered(0).is_empty());
}
