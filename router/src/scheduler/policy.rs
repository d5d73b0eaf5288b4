use super::{SchedMessage, TrafficClass, CLASS_COUNT};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// A scheduling discipline over the per-class queues. `schedule` moves up to
/// `max_batch` messages into `batch` and must never block.
pub trait SchedulePolicy: Send + Sync {
    fn schedule(&self, queues: &mut [mpsc::Receiver<SchedMessage>], max_batch: usize, batch: &mut Vec<SchedMessage>);
    fn name(&self) -> &'static str;
}

fn drain(rx: &mut mpsc::Receiver<SchedMessage>, limit: usize, batch: &mut Vec<SchedMessage>) -> usize {
    let mut taken = 0;
    while taken < limit {
        match rx.try_recv() {
            Ok(msg) => {
                batch.push(msg);
                taken += 1;
            }
            Err(_) => break,
        }
    }
    taken
}

/// A message is only scheduled while every higher-priority queue is empty:
/// COLIBRI > EPIC > BFD > SCMP > SCION > Others.
pub struct StrictPriority;

impl SchedulePolicy for StrictPriority {
    fn schedule(&self, queues: &mut [mpsc::Receiver<SchedMessage>], max_batch: usize, batch: &mut Vec<SchedMessage>) {
        let mut read = 0;
        for class in TrafficClass::ALL {
            read += drain(&mut queues[class.index()], max_batch - read, batch);
            if read == max_batch {
                break;
            }
        }
    }

    fn name(&self) -> &'static str {
        "strict_priority"
    }
}

/// Most of the batch goes to COLIBRI; every other class gets at most one
/// slot, in priority order.
pub struct ColibriPriority;

impl SchedulePolicy for ColibriPriority {
    fn schedule(&self, queues: &mut [mpsc::Receiver<SchedMessage>], max_batch: usize, batch: &mut Vec<SchedMessage>) {
        let colibri_slots = max_batch.saturating_sub(CLASS_COUNT);
        let mut read = drain(&mut queues[TrafficClass::Colibri.index()], colibri_slots, batch);
        for class in TrafficClass::ALL.into_iter().skip(1) {
            if read == max_batch {
                break;
            }
            read += drain(&mut queues[class.index()], 1, batch);
        }
    }

    fn name(&self) -> &'static str {
        "colibri_priority"
    }
}

/// One message per class, with the starting class rotating every call.
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self { next: AtomicUsize::new(0) }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulePolicy for RoundRobin {
    fn schedule(&self, queues: &mut [mpsc::Receiver<SchedMessage>], max_batch: usize, batch: &mut Vec<SchedMessage>) {
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let mut read = 0;
        for i in 0..CLASS_COUNT {
            if read == max_batch {
                break;
            }
            let class = TrafficClass::ALL[(start + i) % CLASS_COUNT];
            read += drain(&mut queues[class.index()], 1, batch);
        }
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Baseline that serves only the best-effort queue.
pub struct OthersOnly;

impl SchedulePolicy for OthersOnly {
    fn schedule(&self, queues: &mut [mpsc::Receiver<SchedMessage>], max_batch: usize, batch: &mut Vec<SchedMessage>) {
        drain(&mut queues[TrafficClass::Others.index()], max_batch, batch);
    }

    fn name(&self) -> &'static str {
        "others_only"
    }
}
