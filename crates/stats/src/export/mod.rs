//! Read side: the flat metric sequence and what is built from it.

pub mod gather;
pub mod metric;
pub mod render;
pub mod tree;

pub use gather::{AddressFamily, Collaborators, InterfaceSnapshot};
pub use metric::{GroupMarker, MetricNode, MetricSequence, PromType};
pub use render::render_text;
pub use tree::{Dict, TreeError, Value, reconstruct_into};
