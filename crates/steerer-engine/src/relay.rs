//! Cross-thread envelope relay between the poller and the interactive thread.
//!
//! The relay is the only object that crosses threads. The poller holds an
//! [`Outbox`] and posts [`Envelope`]s; the interactive thread owns the
//! single [`Inbox`] and drains it. The channel is an unbounded crossbeam
//! channel, which gives the guarantees the dispatcher relies on:
//!
//! - posting never blocks the poller;
//! - envelopes are received in exactly the order they were posted, with
//!   no coalescing;
//! - an envelope, once posted, is received exactly once (the inbox is not
//!   cloneable, so there is one consumer).

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use steerer_core::{MessageTag, SimHandle};

/// Notification that a message is waiting in the library.
///
/// `target` is the session the library reported the message for; it is
/// `None` when the poll call itself failed and no session is known. The
/// payload is never carried here: the dispatcher fetches it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Session the message is addressed to.
    pub target: Option<SimHandle>,
    /// What kind of message is waiting.
    pub tag: MessageTag,
}

impl Envelope {
    /// An envelope for a known session.
    pub fn to(handle: SimHandle, tag: MessageTag) -> Self {
        Self {
            target: Some(handle),
            tag,
        }
    }

    /// A transient poll failure not tied to any session.
    pub fn poll_failed() -> Self {
        Self {
            target: None,
            tag: MessageTag::Error,
        }
    }
}

/// Create a connected outbox/inbox pair.
pub fn channel() -> (Outbox, Inbox) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Outbox { tx }, Inbox { rx })
}

/// Posting side, held by the poller.
#[derive(Clone, Debug)]
pub struct Outbox {
    tx: Sender<Envelope>,
}

impl Outbox {
    /// Post an envelope. Returns `false` if the inbox has been dropped.
    pub fn post(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }
}

/// Receiving side, owned by the interactive thread.
#[derive(Debug)]
pub struct Inbox {
    rx: Receiver<Envelope>,
}

impl Inbox {
    /// Take the next envelope if one is already queued.
    pub fn try_next(&self) -> Option<Envelope> {
        match self.rx.try_recv() {
            Ok(env) => Some(env),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next envelope.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Envelope> {
        match self.rx.recv_timeout(timeout) {
            Ok(env) => Some(env),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Envelopes currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn post_after_inbox_dropped_reports_failure() {
        let (outbox, inbox) = channel();
        assert!(outbox.post(Envelope::poll_failed()));
        drop(inbox);
        assert!(!outbox.post(Envelope::poll_failed()));
    }

    #[test]
    fn queued_envelopes_survive_outbox_drop() {
        let (outbox, inbox) = channel();
        outbox.post(Envelope::to(SimHandle(1), MessageTag::Status));
        drop(outbox);
        assert_eq!(
            inbox.try_next(),
            Some(Envelope::to(SimHandle(1), MessageTag::Status))
        );
        assert_eq!(inbox.try_next(), None);
    }

    #[test]
    fn next_timeout_returns_none_when_idle() {
        let (_outbox, inbox) = channel();
        assert_eq!(inbox.next_timeout(Duration::from_millis(5)), None);
    }

    #[test]
    fn cross_thread_posts_arrive_in_order() {
        let (outbox, inbox) = channel();
        let poster = std::thread::spawn(move || {
            for i in 0..500 {
                outbox.post(Envelope::to(SimHandle(i), MessageTag::Status));
            }
        });
        let mut received = Vec::new();
        while received.len() < 500 {
            if let Some(env) = inbox.next_timeout(Duration::from_secs(2)) {
                received.push(env.target.unwrap().0);
            } else {
                panic!("relay stalled after {} envelopes", received.len());
            }
        }
        poster.join().unwrap();
        assert_eq!(received, (0..500).collect::<Vec<_>>());
    }

    fn arb_envelope() -> impl Strategy<Value = Envelope> {
        let tag = proptest::sample::select(MessageTag::ALL.to_vec());
        (proptest::option::of(0i32..8), tag).prop_map(|(h, tag)| Envelope {
            target: h.map(SimHandle),
            tag,
        })
    }

    proptest! {
        #[test]
        fn delivery_is_fifo_and_lossless(envs in proptest::collection::vec(arb_envelope(), 0..64)) {
            let (outbox, inbox) = channel();
            for env in &envs {
                prop_assert!(outbox.post(*env));
            }
            prop_assert_eq!(inbox.len(), envs.len());
            let mut out = Vec::new();
            while let Some(env) = inbox.try_next() {
                out.push(env);
            }
            prop_assert_eq!(out, envs);
            prop_assert!(inbox.is_empty());
        }
    }
}
