//! Service supervisor
//!
//! Starts one OS process per enabled protocol, so that a crash or a port
//! conflict in one listener leaves the others running, and tears them all
//! down on interrupt.

pub mod child;
pub mod core;
pub mod handle;

pub use child::run_child;
pub use core::{RunSummary, StopHandle, Supervisor};
pub use handle::{ListenerExit, ListenerHandle, ListenerState};
