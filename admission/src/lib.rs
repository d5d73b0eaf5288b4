pub mod config;
mod demand;
pub mod service;
pub mod stateful;
pub mod stateless;

#[cfg(test)]
mod equivalence;

pub use config::{AdmissionConfig, ConfigError};
pub use service::SetupService;
pub use stateful::StatefulAdmission;
pub use stateless::StatelessAdmission;

use async_trait::async_trait;
use colibri_base::{AllocationBead, BwCls, SegmentId, SetupRequest};
use colibri_store::{ColibriStorage, StoreError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("admission denied for {id}: maximum allocatable class {max_alloc} below requested minimum {min_requested}")]
    Denied { id: SegmentId, max_alloc: BwCls, min_requested: BwCls },
    #[error("store failed during {operation} for {id}: {source}")]
    Storage {
        id: SegmentId,
        operation: &'static str,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("admission cancelled")]
    Cancelled,
}

impl AdmissionError {
    pub(crate) fn storage(id: SegmentId, operation: &'static str) -> impl FnOnce(StoreError) -> AdmissionError {
        move |source| match source {
            StoreError::Cancelled => AdmissionError::Cancelled,
            source => AdmissionError::Storage { id, operation, source },
        }
    }
}

/// Decides whether a segment reservation setup request is admitted at this
/// AS and with which bandwidth class. Implementations read the store but
/// never mutate it; committing an accepted allocation is a separate
/// transaction owned by the caller.
#[async_trait]
pub trait Admitter: Send + Sync {
    /// On success the granted bead has been appended to the request's
    /// allocation trail. Denial, store failures and cancellation leave the
    /// request untouched.
    async fn admit(
        &self,
        token: &CancellationToken,
        store: &dyn ColibriStorage,
        req: &mut SetupRequest,
    ) -> Result<AllocationBead, AdmissionError>;
}

/// The intermediate quantities of one admission decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AdmissionValues {
    pub available: u64,
    pub tube_ratio: f64,
    pub link_ratio: f64,
    pub ideal: u64,
}

pub(crate) fn finish_admission(req: &mut SetupRequest, available: u64, ideal: u64) -> Result<AllocationBead, AdmissionError> {
    let max_alloc = BwCls::from_kbps(available.min(ideal));
    if max_alloc < req.min_bw {
        log::debug!(
            "admission.event=denied id={} max_alloc={} min={} available={} ideal={}",
            req.id,
            max_alloc,
            req.min_bw,
            available,
            ideal
        );
        return Err(AdmissionError::Denied { id: req.id, max_alloc, min_requested: req.min_bw });
    }
    let bead = AllocationBead { alloc: BwCls::min(max_alloc, req.max_bw), max: max_alloc };
    req.alloc_trail.push(bead);
    log::debug!("admission.event=granted id={} alloc={} max={}", req.id, bead.alloc, bead.max);
    Ok(bead)
}
