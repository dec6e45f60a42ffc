//! Bounded Handoff Buffers
//!
//! The pipeline moves frames between threads through bounded structures with
//! two deliberately different overflow policies:
//!
//! - [`BoundedQueue`]: rejects the *newest* item when full. Used at ingestion,
//!   where a frame that cannot be processed promptly is worthless.
//! - [`OverwriteRing`]: evicts the *oldest* item when full. Used for results
//!   and evidence, where the freshest state matters more than a stale one.
//!
//! Overflow is not an error on either side; it is counted and observable.

mod queue;
mod ring;

pub use queue::BoundedQueue;
pub use ring::OverwriteRing;
