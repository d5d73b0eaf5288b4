pub mod policy;
pub mod pool;

pub use policy::{ColibriPriority, OthersOnly, RoundRobin, SchedulePolicy, StrictPriority};
pub use pool::BufferPool;

use parking_lot::Mutex;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;

pub const CLASS_COUNT: usize = 6;

/// Traffic class of an outbound packet. Order is meaningful: it is the
/// strict-priority order from highest (COLIBRI) to lowest (best effort).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    Colibri,
    Epic,
    Bfd,
    Scmp,
    Scion,
    Others,
}

impl TrafficClass {
    pub const ALL: [TrafficClass; CLASS_COUNT] =
        [TrafficClass::Colibri, TrafficClass::Epic, TrafficClass::Bfd, TrafficClass::Scmp, TrafficClass::Scion, TrafficClass::Others];

    pub fn index(self) -> usize {
        match self {
            TrafficClass::Colibri => 0,
            TrafficClass::Epic => 1,
            TrafficClass::Bfd => 2,
            TrafficClass::Scmp => 3,
            TrafficClass::Scion => 4,
            TrafficClass::Others => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrafficClass::Colibri => "colibri",
            TrafficClass::Epic => "epic",
            TrafficClass::Bfd => "bfd",
            TrafficClass::Scmp => "scmp",
            TrafficClass::Scion => "scion",
            TrafficClass::Others => "others",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("no free buffer for class {}", .class.as_str())]
    NoFreeBuffer { class: TrafficClass },
    #[error("queue full for class {}", .class.as_str())]
    QueueFull { class: TrafficClass },
    #[error("unbalanced buffer return for class {}", .class.as_str())]
    UnbalancedReturn { class: TrafficClass },
    #[error("payload of {len} bytes exceeds the {cap} byte buffers")]
    PayloadTooLarge { len: usize, cap: usize },
}

/// One message sitting in a class queue: a borrowed pool buffer plus the
/// underlay destination to write it to.
#[derive(Debug)]
pub struct SchedMessage {
    pub class: TrafficClass,
    pub buffer: bytes::BytesMut,
    pub dest: SocketAddr,
}

/// The per-outbound-interface scheduling state: one bounded FIFO queue and
/// one buffer pool per traffic class, plus the non-empty wakeup signal for
/// the drainer.
pub struct IfaceQueues {
    senders: Vec<mpsc::Sender<SchedMessage>>,
    receivers: Mutex<Vec<mpsc::Receiver<SchedMessage>>>,
    pools: Vec<BufferPool>,
    nonempty: Notify,
}

impl IfaceQueues {
    pub fn new(queue_size: usize, buffers_per_class: usize, buffer_bytes: usize) -> Self {
        let mut senders = Vec::with_capacity(CLASS_COUNT);
        let mut receivers = Vec::with_capacity(CLASS_COUNT);
        let mut pools = Vec::with_capacity(CLASS_COUNT);
        for _ in 0..CLASS_COUNT {
            let (tx, rx) = mpsc::channel(queue_size);
            senders.push(tx);
            receivers.push(rx);
            pools.push(BufferPool::new(buffers_per_class, buffer_bytes));
        }
        Self { senders, receivers: Mutex::new(receivers), pools, nonempty: Notify::new() }
    }

    /// Copies `bytes` into a pool buffer and places it on the class queue.
    /// Never blocks: pool exhaustion and a full queue surface as errors that
    /// the caller treats as backpressure.
    pub fn enqueue(&self, class: TrafficClass, bytes: &[u8], dest: SocketAddr) -> Result<(), SchedulerError> {
        let pool = &self.pools[class.index()];
        if bytes.len() > pool.buffer_bytes() {
            return Err(SchedulerError::PayloadTooLarge { len: bytes.len(), cap: pool.buffer_bytes() });
        }
        let mut buffer = pool.acquire().ok_or(SchedulerError::NoFreeBuffer { class })?;
        buffer.extend_from_slice(bytes);
        match self.senders[class.index()].try_send(SchedMessage { class, buffer, dest }) {
            Ok(()) => {
                self.nonempty.notify_one();
                Ok(())
            }
            Err(TrySendError::Full(msg)) | Err(TrySendError::Closed(msg)) => {
                pool.release(msg.buffer).map_err(|_| SchedulerError::UnbalancedReturn { class })?;
                Err(SchedulerError::QueueFull { class })
            }
        }
    }

    /// Drains a batch according to the policy. Never blocks; an empty batch
    /// means all queues were empty.
    pub fn schedule(&self, policy: &dyn SchedulePolicy, max_batch: usize, batch: &mut Vec<SchedMessage>) {
        let mut receivers = self.receivers.lock();
        policy.schedule(&mut receivers, max_batch, batch);
        if !batch.is_empty() {
            // More packets may remain; keep the drainer spinning.
            self.nonempty.notify_one();
        }
    }

    /// Parks until at least one enqueue happened since the last wakeup.
    pub async fn wait_nonempty(&self) {
        self.nonempty.notified().await;
    }

    /// Returns the buffers of a transmitted batch to their pools.
    pub fn return_buffers(&self, batch: &mut Vec<SchedMessage>) -> Result<(), SchedulerError> {
        for msg in batch.drain(..) {
            self.pools[msg.class.index()].release(msg.buffer).map_err(|_| SchedulerError::UnbalancedReturn { class: msg.class })?;
        }
        Ok(())
    }

    pub fn free_buffers(&self, class: TrafficClass) -> usize {
        self.pools[class.index()].free_count()
    }

    pub fn outstanding_buffers(&self, class: TrafficClass) -> usize {
        self.pools[class.index()].outstanding()
    }
}
