pub mod bwcls;
pub mod capacity;
pub mod demand;
pub mod ident;
pub mod request;
pub mod reservation;
pub mod tick;
pub mod time;

pub use bwcls::BwCls;
pub use capacity::{Capacities, InterfaceCapacities};
pub use ident::{AsId, IsdAs, SegmentId, SEGMENT_ID_LEN};
pub use request::{AllocationBead, SetupRequest};
pub use reservation::{
    IndexNumber, IndexState, PathEndProps, PathStep, Reservation, ReservationError, ReservationIndex, RlcCls, SplitCls,
};
pub use tick::Tick;
