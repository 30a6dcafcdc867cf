//! In-process message broker for Weft
//!
//! Topic pub/sub with at-least-once local delivery. Each subscription owns a
//! bounded queue drained by its own worker task, so a slow subscriber never
//! back-pressures the others; overflow drops the oldest message and counts
//! the drop.

pub mod broker;
pub mod handler;

pub use broker::*;
pub use handler::*;
