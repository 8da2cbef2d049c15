//! Local attach walkthrough against the scripted library.
//!
//! Demonstrates:
//!   1. Building a `SteererConfig` from the environment
//!   2. Attaching to a simulation through its steering directory
//!   3. Receiving definitions and a status update through the poller
//!   4. Steering a parameter and pausing/resuming
//!   5. The simulation stopping on its own, and closing the session
//!
//! Run with:
//!   REG_STEER_DIRECTORY=/tmp/steer cargo run --example local_attach
//!
//! Set `RUST_LOG=steerer_engine=debug` to watch the poller and dispatcher.

use std::path::Path;
use std::time::{Duration, Instant};

use smallvec::smallvec;
use steerer_core::{IoDirection, MessageTag, ParamHandle, StatusReport, SupportedCommand};
use steerer_engine::{Steerer, SteererConfig, TracingNotifier};
use steerer_test_utils::{iotype, param, MockLibrary};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "steerer_engine=info".into()),
        )
        .init();

    let lib = MockLibrary::new();
    let probe = lib.probe();

    let mut config = SteererConfig::from_env();
    config.poll.interval_ms = 200;
    let mut steerer = Steerer::new(Box::new(lib), Box::new(TracingNotifier), config)?;

    // Fall back to a fixed directory when REG_STEER_DIRECTORY is unset.
    let handle = match steerer.attach_local(None) {
        Ok(h) => h,
        Err(_) => steerer.attach_local(Some(Path::new("/tmp/steer")))?,
    };
    println!("attached: handle {handle}, poll interval {}", steerer.poll_interval());

    // ── the simulation registers its parameters and I/O types ──
    probe.set_params(
        handle,
        vec![
            param(1, "timestep", "0.01", true),
            param(2, "iteration", "0", false),
        ],
    );
    probe.set_iotypes(handle, vec![iotype(10, "velocity_field", IoDirection::Out)]);
    probe.push_message(handle, MessageTag::ParamDefs);
    probe.push_message(handle, MessageTag::IoDefs);
    pump(&mut steerer, Duration::from_secs(1));

    if let Some(view) = steerer.session_view(handle) {
        for p in view.params() {
            let mode = if p.steerable { "steered" } else { "monitored" };
            println!("  param {:<10} = {:<6} ({mode})", p.label, p.value);
        }
        for t in view.iotypes() {
            println!("  iotype {} ({:?})", t.label, t.direction);
        }
    }

    // ── steer ──
    steerer.set_parameter(handle, ParamHandle(1), "0.005")?;
    let sent = steerer.emit_parameters(handle)?;
    println!("sent {sent} parameter value(s)");

    steerer.stage_frequency(handle, steerer_core::IoTypeId(10), 25)?;
    steerer.emit_frequencies(handle)?;

    steerer.emit_pause(handle)?;
    steerer.emit_resume(handle)?;

    // ── the simulation stops on its own ──
    probe.push_status(
        handle,
        StatusReport {
            seq_num: 100,
            commands: smallvec![SupportedCommand::Stop.code()],
        },
    );
    probe.push_message(handle, MessageTag::Status);
    pump(&mut steerer, Duration::from_secs(1));

    if let Some(view) = steerer.session_view(handle) {
        println!(
            "session {handle}: status {:?}, closed by peer: {}",
            view.status(),
            view.is_closed_by_peer()
        );
    }
    steerer.close_session(handle);
    println!("poller: {:?}", steerer.poller_state());

    steerer.shutdown();
    Ok(())
}

/// Dispatch envelopes for `budget`.
fn pump(steerer: &mut Steerer, budget: Duration) {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        steerer.process_for(Duration::from_millis(50));
    }
}
