// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn ann(device_id: &str, rank: u64, is_leader: bool) -> Announcement {
    Announcement {
        version: 1,
        port: 9,
        bus_name: format!(":{device_id}"),
        device_id: device_id.to_owned(),
        device_name: format!("name-{device_id}"),
        rank,
        is_leader,
    }
}

#[test]
fn non_leader_announcements_drop() {
    let mut tracker = LeaderTracker::new();
    assert_eq!(tracker.on_announced(&ann("a", 99, false)), AnnounceAction::Drop);
    assert_eq!(tracker.current().device_id, "");
}

#[test]
fn first_leader_connects_without_teardown() -> anyhow::Result<()> {
    let mut tracker = LeaderTracker::new();
    match tracker.on_announced(&ann("a", 1, true)) {
        AnnounceAction::Connect { teardown: None, target } => {
            assert_eq!(target.device_id, "a");
            assert_eq!(target.port, 9);
        }
        other => anyhow::bail!("unexpected action: {other:?}"),
    }
    assert_eq!(tracker.current().rank, 1);
    assert_eq!(tracker.session(), None);
    Ok(())
}

#[test]
fn lower_rank_drops_higher_wins() -> anyhow::Result<()> {
    let mut tracker = LeaderTracker::new();
    let _ = tracker.on_announced(&ann("a", 5, true));
    let _ = tracker.on_join_completed("a", Some(SessionId(1)));

    assert_eq!(tracker.on_announced(&ann("b", 4, true)), AnnounceAction::Drop);
    assert_eq!(tracker.current().device_id, "a");

    match tracker.on_announced(&ann("b", 6, true)) {
        AnnounceAction::Connect { teardown: Some(torn), target } => {
            assert_eq!(torn.session, SessionId(1));
            assert_eq!(torn.device_id, "a");
            assert_eq!(target.device_id, "b");
        }
        other => anyhow::bail!("unexpected action: {other:?}"),
    }
    Ok(())
}

#[test]
fn sessionless_old_leader_lands_in_ignore_set() -> anyhow::Result<()> {
    let mut tracker = LeaderTracker::new();
    let _ = tracker.on_announced(&ann("a", 1, true));
    // Join still in flight when b outbids a.
    match tracker.on_announced(&ann("b", 2, true)) {
        AnnounceAction::Connect { teardown: None, .. } => {}
        other => anyhow::bail!("unexpected action: {other:?}"),
    }

    // a's late join reply is consumed exactly once.
    assert_eq!(
        tracker.on_join_completed("a", Some(SessionId(7))),
        JoinOutcome::Ignored { session: Some(SessionId(7)) }
    );
    assert_eq!(
        tracker.on_join_completed("a", Some(SessionId(8))),
        JoinOutcome::Stale { session: Some(SessionId(8)) }
    );

    // b's completion is accepted.
    match tracker.on_join_completed("b", Some(SessionId(9))) {
        JoinOutcome::Connected { device_id, session, .. } => {
            assert_eq!(device_id, "b");
            assert_eq!(session, SessionId(9));
        }
        other => anyhow::bail!("unexpected outcome: {other:?}"),
    }
    assert_eq!(tracker.session(), Some(SessionId(9)));
    Ok(())
}

#[test]
fn name_change_only_signals_with_live_session() {
    let mut tracker = LeaderTracker::new();
    let _ = tracker.on_announced(&ann("a", 1, true));

    // No session yet: the rename is recorded silently.
    let mut renamed = ann("a", 1, true);
    renamed.device_name = "fancy".to_owned();
    assert_eq!(tracker.on_announced(&renamed), AnnounceAction::Drop);
    assert_eq!(tracker.current().device_name, "fancy");

    let _ = tracker.on_join_completed("a", Some(SessionId(1)));
    let mut renamed = ann("a", 1, true);
    renamed.device_name = "fancier".to_owned();
    assert_eq!(
        tracker.on_announced(&renamed),
        AnnounceAction::NameChanged {
            device_id: "a".to_owned(),
            device_name: "fancier".to_owned()
        }
    );
}

#[test]
fn join_failure_is_non_fatal() -> anyhow::Result<()> {
    let mut tracker = LeaderTracker::new();
    let _ = tracker.on_announced(&ann("a", 1, true));
    match tracker.on_join_completed("a", None) {
        JoinOutcome::Failed { device_id, .. } => assert_eq!(device_id, "a"),
        other => anyhow::bail!("unexpected outcome: {other:?}"),
    }
    // Still current; a higher-ranked leader is still accepted.
    assert_eq!(tracker.current().device_id, "a");
    assert!(matches!(tracker.on_announced(&ann("b", 2, true)), AnnounceAction::Connect { .. }));
    Ok(())
}

#[test]
fn session_loss_clears_and_reaccepts_same_leader() {
    let mut tracker = LeaderTracker::new();
    let _ = tracker.on_announced(&ann("a", 1, true));
    let _ = tracker.on_join_completed("a", Some(SessionId(3)));

    assert_eq!(tracker.on_session_lost(SessionId(99)), None);
    assert_eq!(
        tracker.on_session_lost(SessionId(3)),
        Some(("a".to_owned(), "name-a".to_owned()))
    );
    assert_eq!(tracker.current(), &CurrentLeader::default());

    // The very same leader re-announcing triggers a fresh join.
    assert!(matches!(tracker.on_announced(&ann("a", 1, true)), AnnounceAction::Connect { .. }));
}

#[test]
fn ignore_set_is_bounded() {
    let mut tracker = LeaderTracker::new();
    for rank in 1..=(IGNORE_CAP as u64 + 5) {
        let _ = tracker.on_announced(&ann(&format!("d{rank}"), rank, true));
    }
    assert_eq!(tracker.ignore_len(), IGNORE_CAP);

    // The oldest entries were evicted; their late replies are just stale.
    assert!(matches!(
        tracker.on_join_completed("d1", Some(SessionId(1))),
        JoinOutcome::Stale { .. }
    ));
    // Recent ones are still suppressed.
    let recent = format!("d{}", IGNORE_CAP + 3);
    assert!(matches!(
        tracker.on_join_completed(&recent, None),
        JoinOutcome::Ignored { .. }
    ));
}
