//! Bounded-parallelism gate with a minimum delay between launches.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

pub const DEFAULT_MAX_CONCURRENT: usize = 2;
pub const DEFAULT_LAUNCH_DELAY: Duration = Duration::from_millis(250);

/// Runs futures with at most `max_concurrent` in flight, starting them in
/// submission order and at least `min_delay` apart.
///
/// Cloning shares the same slots and launch schedule.
#[derive(Debug, Clone)]
pub struct Limiter {
    slots: Arc<Semaphore>,
    queue: Arc<Mutex<LaunchQueue>>,
    turn_changed: Arc<Notify>,
    min_delay: Duration,
}

#[derive(Debug, Default)]
struct LaunchQueue {
    next_ticket: u64,
    serving: u64,
    abandoned: BTreeSet<u64>,
    last_launch: Option<Instant>,
}

impl LaunchQueue {
    fn advance(&mut self) {
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }
}

impl Default for Limiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, DEFAULT_LAUNCH_DELAY)
    }
}

impl Limiter {
    #[must_use]
    pub fn new(max_concurrent: usize, min_delay: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            queue: Arc::new(Mutex::new(LaunchQueue::default())),
            turn_changed: Arc::new(Notify::new()),
            min_delay,
        }
    }

    /// Queue `work` and return a future that waits for a slot and the launch
    /// delay, then drives it to completion.
    ///
    /// The queue position is taken when `run` is called, not when the
    /// returned future is first polled, so spawning the futures on a
    /// multi-threaded runtime keeps the call order. Dropping the future
    /// gives its position up.
    pub fn run<F>(&self, work: F) -> impl Future<Output = F::Output> + use<F>
    where
        F: Future,
    {
        let ticket = self.claim();
        async move {
            let permit = ticket.wait_for_launch().await;
            let output = work.await;
            drop(permit);
            output
        }
    }

    /// Wrap `f` so every call goes through this limiter.
    pub fn wrap<A, F, Fut, T>(&self, f: F) -> impl Fn(A) -> LimitedFuture<T>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let limiter = self.clone();
        move |arg| Box::pin(limiter.run(f(arg)))
    }

    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    fn claim(&self) -> Ticket {
        let mut queue = self.lock_queue();
        let number = queue.next_ticket;
        queue.next_ticket += 1;
        Ticket {
            limiter: self.clone(),
            number,
            launched: false,
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, LaunchQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub type LimitedFuture<T> = std::pin::Pin<Box<dyn Future<Output = T> + Send>>;

/// A place in the launch queue.
struct Ticket {
    limiter: Limiter,
    number: u64,
    launched: bool,
}

impl Ticket {
    async fn wait_for_launch(mut self) -> Option<OwnedSemaphorePermit> {
        let limiter = &self.limiter;
        loop {
            let mut notified = pin!(limiter.turn_changed.notified());
            notified.as_mut().enable();
            if limiter.lock_queue().serving == self.number {
                break;
            }
            notified.await;
        }

        // The semaphore is never closed; run unthrottled if it ever is.
        let permit = Arc::clone(&limiter.slots).acquire_owned().await.ok();
        let last_launch = limiter.lock_queue().last_launch;
        if let Some(last) = last_launch {
            tokio::time::sleep_until(last + limiter.min_delay).await;
        }
        {
            let mut queue = limiter.lock_queue();
            queue.last_launch = Some(Instant::now());
            queue.advance();
        }
        limiter.turn_changed.notify_waiters();
        self.launched = true;
        permit
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.launched {
            return;
        }
        {
            let mut queue = self.limiter.lock_queue();
            if queue.serving == self.number {
                queue.advance();
            } else {
                queue.abandoned.insert(self.number);
            }
        }
        self.limiter.turn_changed.notify_waiters();
    }
}
