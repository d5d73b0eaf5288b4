pub mod config;
pub mod drain;
pub mod mac;
pub mod metrics;
pub mod packet;
pub mod path;
pub mod processor;
pub mod scheduler;
pub mod timestamp;

pub use config::{RouterConfig, RouterConfigError, SchedulerPolicyKind};
pub use drain::{BatchWriter, Drainer};
pub use metrics::RouterMetrics;
pub use packet::{ColibriPacket, PathVariant, RawHostAddr, ScionHeader};
pub use processor::{classify, ColibriProcessor, Forwarding, PacketError, ProcessOutcome, RouterTopology};
pub use scheduler::{IfaceQueues, SchedMessage, SchedulerError, TrafficClass};
