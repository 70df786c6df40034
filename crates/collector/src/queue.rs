use protocol::{InterceptedCommand, Status};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Command(InterceptedCommand),
    /// The build finished; no more commands will be drained.
    End,
}

/// FIFO of reported commands with many producers and one waiting consumer.
#[derive(Debug, Default)]
pub struct CommandQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    received: u64,
    pending: u64,
    ended: bool,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a batch contiguously and returns the bookkeeping as of right after the
    /// append.
    pub fn push_commands(&self, commands: Vec<InterceptedCommand>) -> Status {
        let status = {
            let mut state = self.state.lock().expect("queue lock");
            let count = commands.len() as u64;
            state
                .items
                .extend(commands.into_iter().map(QueueItem::Command));
            state.received += count;
            state.pending += count;
            Status::from_counts(state.received, state.pending)
        };
        self.notify.notify_one();
        status
    }

    /// Pushes the termination sentinel. Only the first call has an effect.
    pub fn push_end(&self) -> bool {
        {
            let mut state = self.state.lock().expect("queue lock");
            if state.ended {
                return false;
            }
            state.ended = true;
            state.items.push_back(QueueItem::End);
        }
        self.notify.notify_one();
        true
    }

    pub fn try_pop(&self) -> Option<QueueItem> {
        let mut state = self.state.lock().expect("queue lock");
        let item = state.items.pop_front()?;
        if matches!(item, QueueItem::Command(_)) {
            state.pending -= 1;
        }
        Some(item)
    }

    /// Waits until an item is available. Meant for a single consumer.
    pub async fn pop(&self) -> QueueItem {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    /// Commands appended but not yet drained.
    pub fn pending(&self) -> u64 {
        self.state.lock().expect("queue lock").pending
    }

    pub fn received(&self) -> u64 {
        self.state.lock().expect("queue lock").received
    }

    pub fn status(&self) -> Status {
        let state = self.state.lock().expect("queue lock");
        Status::from_counts(state.received, state.pending)
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().expect("queue lock").ended
    }
}
