//! Write side: everything lifecycle events mutate.

pub mod average;
pub mod codec;
pub mod control;
pub mod counter;
pub mod interval;
pub mod session;
pub mod totals;

pub use average::{AverageState, RollingAverage};
pub use codec::{CodecChainSnapshot, CodecRate, CodecRateTable};
pub use control::{CommandStats, ControlPeerStats, ControlPeerTable, NgCommand};
pub use counter::Counter;
pub use interval::{IntervalSnapshot, IntervalWindow, credited_duration};
pub use session::{
    CountOp, FamilyClass, MediaFamilies, MonologueReport, Ownership, SessionInfo, SessionReport,
    StreamReport,
};
pub use totals::{PacketTotals, RequestKind, TermReason, TotalCounters, TotalStats};
