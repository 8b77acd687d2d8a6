use crossbeam::channel::{unbounded, Receiver, Sender, TrySendError};

use crate::engine::{CommitReport, CommitStrategy};

/// Long-running operations that report progress and can be cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LongProcess {
    Commit,
    Fill,
    Replace,
    Find,
    Histogram,
}

/// Notifications published by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StreamOpened { len: u64, read_only: bool },
    Closed,
    ReadOnlyChanged(bool),
    PositionChanged(u64),
    /// Offsets reverted by one undo step
    EditUndone(Vec<u64>),
    CommitStarted(CommitStrategy),
    /// Fraction in `[0, 1]` of the running process
    Progress { process: LongProcess, fraction: f64 },
    CommitCompleted(CommitReport),
    CommitCancelled,
    FillCompleted { edits: u64 },
    ReplaceCompleted { edits: u64 },
    /// A non-commit process stopped on a cancel request
    ProcessCancelled(LongProcess),
    DataCopied { len: u64 },
    DataCopiedToStream { len: u64 },
    DataPasted { offset: u64, len: u64 },
}

/// Fan-out of engine events to every subscriber.
///
/// Delivery is fire-and-forget and never blocks: a full subscriber misses the
/// event, and one that hung up is dropped on the next send.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<EngineEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Attach a caller-built sender. A bounded channel caps how many undrained
    /// events pile up; anything past the cap is dropped.
    pub fn subscribe_with(&mut self, tx: Sender<EngineEvent>) {
        self.subscribers.push(tx);
    }

    pub fn emit(&mut self, event: EngineEvent) {
        if self.subscribers.is_empty() {
            return;
        }
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives_events() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(EngineEvent::PositionChanged(4));

        assert_eq!(a.try_recv().unwrap(), EngineEvent::PositionChanged(4));
        assert_eq!(b.try_recv().unwrap(), EngineEvent::PositionChanged(4));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.emit(EngineEvent::Closed);

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), EngineEvent::Closed);
    }

    #[test]
    fn test_full_subscriber_misses_events_without_blocking() {
        let mut bus = EventBus::new();
        let (tx, rx) = crossbeam::channel::bounded(1);
        bus.subscribe_with(tx);

        bus.emit(EngineEvent::PositionChanged(1));
        bus.emit(EngineEvent::PositionChanged(2));
        bus.emit(EngineEvent::PositionChanged(3));

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(rx.try_recv().unwrap(), EngineEvent::PositionChanged(1));
        assert!(rx.try_recv().is_err());

        drop(rx);
        bus.emit(EngineEvent::Closed);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
