//! The scheduler drainer: a worker parked on the non-empty signal that
//! drains batches by policy, hands them to the underlay writer and returns
//! the buffers to their pools.

use crate::scheduler::{IfaceQueues, SchedMessage, SchedulePolicy};
use log::{info, trace, warn};
use std::io;
use std::sync::Arc;
use tokio::sync::watch;

/// Writes a scheduled batch to the underlay. Implemented by the socket
/// layer; tests substitute a recorder.
pub trait BatchWriter: Send + Sync {
    fn write_batch(&self, batch: &[SchedMessage]) -> io::Result<usize>;
}

pub struct Drainer {
    queues: Arc<IfaceQueues>,
    policy: Box<dyn SchedulePolicy>,
    max_batch: usize,
    shutdown: watch::Sender<bool>,
}

impl Drainer {
    pub fn new(queues: Arc<IfaceQueues>, policy: Box<dyn SchedulePolicy>, max_batch: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { queues, policy, max_batch, shutdown }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Blocks on the non-empty signal and drains until shut down. Scheduling
    /// itself never blocks; only this loop parks.
    pub async fn run(&self, writer: &dyn BatchWriter) {
        let mut shutdown = self.shutdown.subscribe();
        let mut batch: Vec<SchedMessage> = Vec::with_capacity(self.max_batch);
        info!("router.event=drainer_start policy={} max_batch={}", self.policy.name(), self.max_batch);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.queues.wait_nonempty() => {}
            }
            loop {
                self.queues.schedule(self.policy.as_ref(), self.max_batch, &mut batch);
                if batch.is_empty() {
                    break;
                }
                match writer.write_batch(&batch) {
                    Ok(sent) => trace!("router.event=batch_sent policy={} messages={sent}", self.policy.name()),
                    Err(err) => warn!("router.event=batch_write_error reason={err}"),
                }
                if let Err(err) = self.queues.return_buffers(&mut batch) {
                    warn!("router.event=buffer_return_error reason={err}");
                    batch.clear();
                }
            }
        }
        info!("router.event=drainer_stop");
    }
}
