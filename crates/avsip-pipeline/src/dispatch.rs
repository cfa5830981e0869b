//! Fanout dispatcher
//!
//! Hands each immutable reading to every enabled sink concurrently and
//! independently. Each sink gets a single-slot latest-wins mailbox: a sink
//! still busy with a previous reading observes only the newest value when it
//! next looks, so superseded readings are dropped and a backlog cannot form.
//! The dispatcher never waits for, aggregates or propagates sink outcomes.

use std::sync::Arc;

use tokio::sync::watch;

use avsip_core::Reading;

/// Receiving end of a sink's mailbox
pub type Mailbox = watch::Receiver<Option<Arc<Reading>>>;

pub struct Dispatcher {
    mailboxes: Vec<(&'static str, watch::Sender<Option<Arc<Reading>>>)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            mailboxes: Vec::new(),
        }
    }

    /// Register one sink and return its mailbox
    pub fn register(&mut self, sink_name: &'static str) -> Mailbox {
        let (tx, rx) = watch::channel(None);
        self.mailboxes.push((sink_name, tx));
        rx
    }

    pub fn sink_count(&self) -> usize {
        self.mailboxes.len()
    }

    /// Publish a reading to every registered sink without waiting
    pub fn dispatch(&self, reading: Reading) {
        let shared = Arc::new(reading);
        for (name, tx) in &self.mailboxes {
            if tx.send(Some(Arc::clone(&shared))).is_err() {
                tracing::debug!(sink = name, "Sink mailbox closed, dropping reading");
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn every_sink_sees_the_reading() {
        let mut dispatcher = Dispatcher::new();
        let mut a = dispatcher.register("a");
        let mut b = dispatcher.register("b");

        dispatcher.dispatch(Reading::new("unit", Utc::now()));

        a.changed().await.unwrap();
        b.changed().await.unwrap();
        assert!(a.borrow().is_some());
        assert!(b.borrow().is_some());
    }

    #[tokio::test]
    async fn slow_sink_observes_only_the_latest_reading() {
        let mut dispatcher = Dispatcher::new();
        let mut mailbox = dispatcher.register("slow");

        for n in 0..5 {
            let mut reading = Reading::new(format!("unit-{}", n), Utc::now());
            reading.dtc_codes.push(format!("P010{}", n));
            dispatcher.dispatch(reading);
        }

        mailbox.changed().await.unwrap();
        let seen = mailbox.borrow_and_update().clone().unwrap();
        assert_eq!(seen.device_id, "unit-4");

        // Nothing queued behind the latest value
        assert!(!mailbox.has_changed().unwrap());
    }

    #[tokio::test]
    async fn closed_mailbox_does_not_disturb_dispatch() {
        let mut dispatcher = Dispatcher::new();
        let gone = dispatcher.register("gone");
        let mut alive = dispatcher.register("alive");
        drop(gone);

        dispatcher.dispatch(Reading::new("unit", Utc::now()));

        alive.changed().await.unwrap();
        assert!(alive.borrow().is_some());
    }
}
