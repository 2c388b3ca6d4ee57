//! Typed progress events for batched estimation and submission steps.

use std::sync::mpsc::Sender;

/// One step of a long-running operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub completed: usize,
    pub total: usize,
    pub message: String,
}

/// Optional subscriber; a dropped receiver simply stops receiving events.
#[derive(Clone, Debug, Default)]
pub struct Progress {
    sink: Option<Sender<ProgressEvent>>,
}

impl Progress {
    pub fn new(sink: Sender<ProgressEvent>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, completed: usize, total: usize, message: impl Into<String>) {
        if let Some(sink) = &self.sink {
            // A receiver that went away is not an error for the producer.
            let _ = sink.send(ProgressEvent {
                completed,
                total,
                message: message.into(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn events_reach_subscriber_in_order() {
        let (tx, rx) = channel();
        let progress = Progress::new(tx);
        progress.emit(1, 2, "first");
        progress.emit(2, 2, "second");
        drop(progress);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].completed, 2);
        assert_eq!(events[0].message, "first");
    }

    #[test]
    fn dropped_receiver_is_ignored() {
        let (tx, rx) = channel();
        drop(rx);
        Progress::new(tx).emit(1, 1, "nobody listening");
    }
}
