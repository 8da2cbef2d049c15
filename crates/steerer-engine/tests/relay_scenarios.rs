//! End-to-end relay scenarios: poller → relay → dispatcher → session view.
//!
//! Each test drives a real poll thread against a scripted [`MockLibrary`]
//! and pumps the steerer's inbox until the expected effect is visible.

use std::thread;
use std::time::{Duration, Instant};

use smallvec::smallvec;
use steerer_core::{IoDirection, MessageTag, SimHandle, StatusReport, SupportedCommand};
use steerer_engine::{
    AttachMode, ConfigError, DetachReason, PollConfig, PollerState, Steerer, SteererConfig,
};
use steerer_test_utils::{iotype, param, LibraryProbe, MockLibrary, RecordingNotifier};

fn fast_config() -> SteererConfig {
    SteererConfig {
        poll: PollConfig {
            interval_ms: 100,
            auto_poll: false,
        },
        default_attach_dir: None,
    }
}

fn attached() -> (Steerer, LibraryProbe, RecordingNotifier, SimHandle) {
    let lib = MockLibrary::new();
    let probe = lib.probe();
    let notifier = RecordingNotifier::new();
    let mut steerer =
        Steerer::new(Box::new(lib), Box::new(notifier.clone()), fast_config()).unwrap();
    let handle = steerer.attach("sim", AttachMode::Remote).unwrap();
    (steerer, probe, notifier, handle)
}

/// Process envelopes until `done` holds, failing after five seconds.
fn pump_until(steerer: &mut Steerer, mut done: impl FnMut(&Steerer) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(steerer) {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        steerer.process_for(Duration::from_millis(50));
    }
}

/// Process until every queued message has been polled and dispatched.
fn drain(steerer: &mut Steerer, probe: &LibraryProbe) {
    pump_until(steerer, |_| probe.pending_messages() == 0);
    // The last polled envelope may still be in the relay.
    steerer.process_for(Duration::from_millis(50));
    steerer.process_pending();
}

#[test]
fn envelopes_are_dispatched_in_post_order() {
    let (mut s, probe, _, h) = attached();
    let tags = [
        MessageTag::ChkDefs,
        MessageTag::ParamDefs,
        MessageTag::SteerLog,
        MessageTag::IoDefs,
        MessageTag::ParamDefs,
    ];
    for tag in tags {
        probe.push_message(h, tag);
    }
    drain(&mut s, &probe);

    let consumes: Vec<_> = probe
        .calls_for(h)
        .into_iter()
        .filter(|c| c.starts_with("consume_"))
        .collect();
    assert_eq!(
        consumes,
        vec![
            "consume_chktype_defs",
            "consume_param_defs",
            "consume_log",
            "consume_iotype_defs",
            "consume_param_defs",
        ]
    );
}

#[test]
fn status_refreshes_params_and_iotypes_without_detaching() {
    let (mut s, probe, notifier, h) = attached();
    probe.set_params(h, vec![param(1, "dt", "0.01", true), param(2, "step", "40", false)]);
    probe.set_iotypes(h, vec![iotype(10, "field", IoDirection::Out)]);
    probe.push_status(
        h,
        StatusReport {
            seq_num: 40,
            commands: smallvec![],
        },
    );
    probe.push_message(h, MessageTag::Status);

    pump_until(&mut s, |s| {
        s.session_view(h).is_some_and(|v| v.last_seq_num() == Some(40))
    });

    let view = s.session_view(h).unwrap();
    assert_eq!(view.params().len(), 2);
    assert_eq!(view.iotypes().len(), 1);
    assert!(s.is_active(h));
    assert!(!view.is_read_only());
    assert_eq!(notifier.warning_count(), 0);
}

#[test]
fn peer_detach_in_status_closes_session() {
    let (mut s, probe, notifier, h) = attached();
    probe.push_status(
        h,
        StatusReport {
            seq_num: 3,
            commands: smallvec![SupportedCommand::Detach.code()],
        },
    );
    probe.push_message(h, MessageTag::Status);

    pump_until(&mut s, |s| !s.is_active(h));

    let view = s.session_view(h).expect("retired view stays readable");
    assert!(view.is_closed_by_peer());
    assert_eq!(view.detach_reason(), Some(DetachReason::PeerDetached));
    assert!(view.is_read_only());
    assert_eq!(notifier.last_status(h).as_deref(), Some("Application has detached"));
    assert_eq!(notifier.warning_count(), 0);
    assert_eq!(probe.count("delete_sim_table_entry"), 1);
    assert_eq!(probe.count("detach"), 0);

    // Last active session gone: polling stops.
    assert_eq!(s.poller_state(), PollerState::Idle);
    assert_eq!(s.retired_sessions(), vec![h]);
    assert!(format!("{s:?}").contains("active: 0"));
    assert!(s.close_session(h).is_some());
    assert!(s.session_view(h).is_none());
    assert!(s.retired_sessions().is_empty());
}

#[test]
fn non_log_consume_failure_detaches_with_one_warning() {
    let cases = [
        (MessageTag::ParamDefs, "consume_param_defs"),
        (MessageTag::IoDefs, "consume_iotype_defs"),
        (MessageTag::ChkDefs, "consume_chktype_defs"),
        (MessageTag::Status, "consume_status"),
    ];
    for (tag, call) in cases {
        let (mut s, probe, notifier, h) = attached();
        probe.fail_call(call);
        probe.push_message(h, tag);
        // A second envelope for the same session must not warn again.
        probe.push_message(h, tag);

        pump_until(&mut s, |s| !s.is_active(h));
        // Polling has stopped; dispatch whatever was already relayed.
        s.process_pending();

        let view = s.session_view(h).unwrap();
        assert!(view.is_read_only(), "{tag}: view not read-only");
        assert!(view.can_close());
        assert_eq!(view.detach_reason(), Some(DetachReason::InternalError));
        assert_eq!(notifier.warning_count(), 1, "{tag}: expected one warning");
        assert_eq!(
            notifier.last_status(h).as_deref(),
            Some("Detached from application due to internal error")
        );
        assert!(!probe.is_attached(h), "{tag}: library still attached");
        assert_eq!(probe.count(call), 1, "{tag}: second envelope was consumed");
    }
}

#[test]
fn log_consume_failure_keeps_session_attached() {
    let (mut s, probe, notifier, h) = attached();
    probe.fail_call("consume_log");
    probe.push_message(h, MessageTag::SteerLog);
    probe.push_message(h, MessageTag::ParamDefs);

    pump_until(&mut s, |_| probe.count("consume_param_defs") == 1);

    assert!(s.is_active(h));
    assert!(!s.session_view(h).unwrap().is_read_only());
    assert_eq!(notifier.warning_count(), 0);
    assert!(probe.is_attached(h));
}

#[test]
fn poll_failures_are_retried_silently() {
    let (mut s, probe, notifier, h) = attached();
    probe.push_poll_error();
    probe.push_poll_error();
    probe.push_message(h, MessageTag::IoDefs);

    pump_until(&mut s, |_| probe.count("consume_iotype_defs") == 1);

    assert!(s.is_active(h));
    assert!(notifier.notices().iter().all(|n| !matches!(
        n,
        steerer_core::Notice::Warning { .. }
    )));
}

#[test]
fn messages_for_closed_session_are_dropped() {
    let (mut s, probe, _, a) = attached();
    let b = s.attach("other", AttachMode::Remote).unwrap();
    probe.push_message(a, MessageTag::ParamDefs);
    probe.push_message(b, MessageTag::ParamDefs);
    // Close before anything is dispatched; the envelope for `a` goes stale.
    s.close_session(a);

    drain(&mut s, &probe);
    assert_eq!(probe.count("consume_param_defs"), 1);
    assert_eq!(
        probe.calls_for(b),
        vec!["supported_commands", "consume_param_defs", "param_defs"]
    );
}

#[test]
fn nothing_is_posted_after_last_session_closes() {
    let (mut s, probe, _, h) = attached();
    s.close_session(h);
    assert_eq!(s.poller_state(), PollerState::Idle);

    let polls = probe.count("poll_next_message");
    probe.push_message(SimHandle(99), MessageTag::Status);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(s.process_pending(), 0);
    assert_eq!(probe.count("poll_next_message"), polls);
}

#[test]
fn closing_one_of_two_sessions_keeps_polling() {
    let (mut s, _probe, _, a) = attached();
    let b = s.attach("b", AttachMode::Remote).unwrap();
    s.close_session(a);
    assert_eq!(s.poller_state(), PollerState::Running);
    s.close_session(b);
    assert_eq!(s.poller_state(), PollerState::Idle);
}

#[test]
fn reattach_after_close_restarts_polling() {
    let (mut s, probe, _, h) = attached();
    s.close_session(h);
    let h2 = s.attach("again", AttachMode::Remote).unwrap();
    assert_eq!(s.poller_state(), PollerState::Running);
    probe.push_message(h2, MessageTag::ParamDefs);
    pump_until(&mut s, |_| probe.count("consume_param_defs") == 1);
}

#[test]
fn out_of_range_interval_leaves_previous_value() {
    let (mut s, _, _, _) = attached();
    let set = s.set_poll_interval_secs(2.0).unwrap();
    assert_eq!(set.as_millis(), 2000);

    for bad in [0.0, 0.05, 10.5, -3.0, f64::NAN] {
        match s.set_poll_interval_secs(bad) {
            Err(ConfigError::IntervalOutOfRange { .. }) => {}
            other => panic!("expected rejection for {bad}, got {other:?}"),
        }
        assert_eq!(s.poll_interval().as_millis(), 2000);
    }
}

#[test]
fn auto_poll_follows_library_recommendation() {
    let lib = MockLibrary::new();
    let probe = lib.probe();
    let config = SteererConfig {
        poll: PollConfig {
            interval_ms: 10_000,
            auto_poll: true,
        },
        default_attach_dir: None,
    };
    probe.set_recommended_interval(Some(Duration::from_millis(100)));
    let mut s =
        Steerer::new(Box::new(lib), Box::new(RecordingNotifier::new()), config).unwrap();
    assert!(s.auto_poll());
    let h = s.attach("sim", AttachMode::Remote).unwrap();
    probe.push_message(h, MessageTag::ChkDefs);
    pump_until(&mut s, |_| probe.count("consume_chktype_defs") == 1);
}

#[test]
fn library_calls_never_overlap_under_load() {
    let (mut s, probe, _, h) = attached();
    for _ in 0..20 {
        probe.push_message(h, MessageTag::Status);
    }
    drain(&mut s, &probe);
    assert_eq!(probe.count("consume_status"), 20);
    assert_eq!(probe.max_concurrent_calls(), 1);
}
