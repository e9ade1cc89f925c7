//! Delayed activation of retry consumers.
//!
//! A single driver task keeps pending activations in a min-heap keyed by
//! due time and fires each one through a oneshot channel. Containers wait on
//! the returned [`Activation`] before handing a delayed record to their
//! listener, so no task sleeps for a whole backoff per record. Stopping a
//! container cancels every activation it owns.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Due time used when a delay does not fit the monotonic clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

enum Command {
    Schedule(Scheduled),
    CancelOwner(String),
    Pending(oneshot::Sender<usize>),
}

struct Scheduled {
    due: Instant,
    id: u64,
    owner: String,
    fire: oneshot::Sender<()>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap, the earliest due entry must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Pending activation returned by [`ActivationScheduler::schedule`].
#[derive(Debug)]
pub struct Activation {
    receiver: oneshot::Receiver<()>,
}

impl Activation {
    /// Wait until due. `false` if cancelled or the scheduler shut down.
    pub async fn wait(self) -> bool {
        self.receiver.await.is_ok()
    }
}

/// Priority-queue scheduler for delayed consumer activation.
pub struct ActivationScheduler {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    next_id: AtomicU64,
}

impl ActivationScheduler {
    /// Start the driver task on the current runtime.
    pub fn start() -> Arc<Self> {
        let (commands, receiver) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        tokio::spawn(drive(receiver, shutdown.clone()));
        Arc::new(Self {
            commands,
            shutdown,
            next_id: AtomicU64::new(0),
        })
    }

    /// Activate after `delay` on behalf of `owner`.
    pub fn schedule(&self, delay: Duration, owner: &str) -> Activation {
        let (fire, receiver) = oneshot::channel();
        let now = Instant::now();
        let scheduled = Scheduled {
            due: now.checked_add(delay).unwrap_or(now + FAR_FUTURE),
            id: self.next_id.fetch_add(1, AtomicOrdering::Relaxed),
            owner: owner.to_string(),
            fire,
        };
        // A closed channel drops `fire`, which resolves the activation as cancelled.
        let _ = self.commands.send(Command::Schedule(scheduled));
        Activation { receiver }
    }

    /// Activate at `due_ms` (epoch millis); immediately if already past.
    pub fn schedule_at_epoch_ms(&self, due_ms: i64, owner: &str) -> Activation {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let delay = u64::try_from(due_ms.saturating_sub(now_ms)).unwrap_or(0);
        self.schedule(Duration::from_millis(delay), owner)
    }

    /// Cancel every pending activation of `owner`.
    pub fn cancel_owner(&self, owner: &str) {
        let _ = self.commands.send(Command::CancelOwner(owner.to_string()));
    }

    /// Number of activations not yet fired or cancelled.
    pub async fn pending(&self) -> usize {
        let (reply, receiver) = oneshot::channel();
        if self.commands.send(Command::Pending(reply)).is_err() {
            return 0;
        }
        receiver.await.unwrap_or(0)
    }

    /// Stop the driver. Pending activations resolve as cancelled.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ActivationScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn drive(mut commands: mpsc::UnboundedReceiver<Command>, shutdown: CancellationToken) {
    let mut queue: BinaryHeap<Scheduled> = BinaryHeap::new();

    loop {
        let next_due = queue.peek().map(|s| s.due);
        let sleep = async move {
            match next_due {
                Some(due) => tokio::time::sleep_until(due).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            command = commands.recv() => match command {
                Some(Command::Schedule(scheduled)) => {
                    trace!(owner = %scheduled.owner, id = scheduled.id, "Activation scheduled");
                    queue.push(scheduled);
                }
                Some(Command::CancelOwner(owner)) => {
                    let before = queue.len();
                    queue.retain(|s| s.owner != owner);
                    debug!(owner = %owner, cancelled = before - queue.len(), "Cancelled activations");
                }
                Some(Command::Pending(reply)) => {
                    let _ = reply.send(queue.len());
                }
                None => break,
            },
            _ = sleep => {
                let now = Instant::now();
                while queue.peek().is_some_and(|s| s.due <= now) {
                    if let Some(scheduled) = queue.pop() {
                        let _ = scheduled.fire.send(());
                    }
                }
            }
        }
    }

    debug!(pending = queue.len(), "Activation scheduler stopped");
}
