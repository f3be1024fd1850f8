use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicUsize, Ordering};

/// A unit of deferred work.
pub trait Job<'a>: Sync {
    fn run(&'a self);
}

/// Single-threaded deferred execution queue.
///
/// Implementations must run jobs in the order they were enqueued, one at a
/// time, never reentrantly. `enqueue` is called from interrupt context and
/// must not block.
///
/// A job that calls [`WorkQueue::reserve`] once and then keeps at most one
/// entry queued at a time must never be dropped.
pub trait WorkQueue<'a>: Sync {
    /// Claims room for one more such job. Unbounded queues always succeed.
    fn reserve(&self) -> bool {
        true
    }

    fn enqueue(&self, job: &'a dyn Job<'a>);
}

/// [`WorkQueue`] backed by an `embassy_sync` channel holding up to `N` jobs.
///
/// At most `N` jobs can reserve an entry, so the channel never overflows.
/// Spawn a task that awaits [`ChannelQueue::run`] to act as the worker.
pub struct ChannelQueue<'a, M: RawMutex, const N: usize> {
    jobs: Channel<M, &'a dyn Job<'a>, N>,
    reserved: AtomicUsize,
}

impl<'a, M: RawMutex, const N: usize> ChannelQueue<'a, M, N> {
    pub const fn new() -> Self {
        Self { jobs: Channel::new(), reserved: AtomicUsize::new(0) }
    }

    /// Worker loop: runs jobs forever as they arrive.
    pub async fn run(&self) -> ! {
        loop {
            let job = self.jobs.receive().await;
            job.run();
        }
    }

    /// Runs the oldest queued job, if any.
    pub fn run_next(&self) -> bool {
        match self.jobs.try_receive() {
            Ok(job) => {
                job.run();
                true
            }
            Err(_) => false,
        }
    }

    /// Runs queued jobs, including ones they enqueue, until the queue is
    /// empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Number of jobs waiting.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Number of entries reserved so far.
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::SeqCst)
    }
}

impl<M: RawMutex, const N: usize> Default for ChannelQueue<'_, M, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, M: RawMutex + Sync, const N: usize> WorkQueue<'a>
    for ChannelQueue<'a, M, N>
{
    fn reserve(&self) -> bool {
        self.reserved
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < N).then_some(n + 1)
            })
            .is_ok()
    }

    fn enqueue(&self, job: &'a dyn Job<'a>) {
        // Only a job that never reserved, or that queues itself twice, can
        // overflow the channel.
        if self.jobs.try_send(job).is_err() {
            #[cfg(feature = "defmt")]
            defmt::error!("work queue full ({} jobs), job dropped", N);
        }
    }
}
