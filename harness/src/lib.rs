//! Runtime harness connecting the messaging plumbing with caller logic
//!
//! The [`TransformerStack`] drives the consume-resolve-handle-acknowledge loop on the
//! transforming side while the [`PublishSink`] serializes access to a publisher on the
//! producing side.

#![deny(missing_docs)]

mod sink;
mod transformer;

pub use sink::*;
pub use transformer::*;
