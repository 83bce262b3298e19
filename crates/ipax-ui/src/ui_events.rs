use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::commands::AppEvent;

#[derive(Clone)]
pub(crate) struct UiEventSender {
    inner: Arc<UiEventQueue>,
}

/// Worker-to-GTK event buffer. Pending progress updates coalesce into the
/// latest value; every other event, log lines included, is kept in order.
pub(crate) struct UiEventQueue {
    queue: Mutex<VecDeque<AppEvent>>,
    notify: mpsc::Sender<()>,
}

impl UiEventQueue {
    pub(crate) fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let (notify, notify_rx) = mpsc::channel(1);
        (
            Arc::new(Self {
                queue: Mutex::new(VecDeque::new()),
                notify,
            }),
            notify_rx,
        )
    }

    pub(crate) fn sender(self: &Arc<Self>) -> UiEventSender {
        UiEventSender {
            inner: Arc::clone(self),
        }
    }

    pub(crate) fn drain(&self) -> Vec<AppEvent> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AppEvent>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: AppEvent) -> bool {
        let mut queue = self.lock();
        let was_empty = queue.is_empty();

        if matches!(event, AppEvent::Progress { .. }) {
            if let Some(existing) = queue
                .iter_mut()
                .find(|ev| matches!(ev, AppEvent::Progress { .. }))
            {
                *existing = event;
                return false;
            }
        }

        queue.push_back(event);
        if was_empty {
            let _ = self.notify.try_send(());
        }
        true
    }
}

impl UiEventSender {
    /// Returns false when the event was merged into a pending one.
    pub(crate) fn send(&self, event: AppEvent) -> bool {
        self.inner.push(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipax_core::{Action, LogLine};

    fn log(text: &str) -> AppEvent {
        AppEvent::Log {
            line: LogLine::info(text),
        }
    }

    #[test]
    fn progress_updates_coalesce() {
        let (queue, _notify) = UiEventQueue::new();
        let sender = queue.sender();
        assert!(sender.send(AppEvent::Progress { percent: 10 }));
        assert!(!sender.send(AppEvent::Progress { percent: 60 }));

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AppEvent::Progress { percent: 60 }));
    }

    #[test]
    fn bursts_of_output_keep_every_line_in_order() {
        let (queue, _notify) = UiEventQueue::new();
        let sender = queue.sender();
        for n in 0..2000 {
            assert!(sender.send(log(&format!("line {n}"))));
        }
        sender.send(AppEvent::Failed {
            action: Action::Execute,
            message: "ssh not found".into(),
        });

        let events = queue.drain();
        assert_eq!(events.len(), 2001);
        assert!(matches!(&events[0], AppEvent::Log { line } if line.text == "line 0"));
        assert!(matches!(&events[1999], AppEvent::Log { line } if line.text == "line 1999"));
        assert!(matches!(events[2000], AppEvent::Failed { .. }));
    }

    #[test]
    fn notifies_only_on_first_pending_event() {
        let (queue, mut notify) = UiEventQueue::new();
        let sender = queue.sender();
        sender.send(log("a"));
        sender.send(log("b"));
        assert!(notify.try_recv().is_ok());
        assert!(notify.try_recv().is_err());

        queue.drain();
        sender.send(log("c"));
        assert!(notify.try_recv().is_ok());
    }
}
