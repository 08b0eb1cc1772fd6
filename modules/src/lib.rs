//! Ready made building blocks for ingestion services, configured through options and environment

#![deny(missing_docs)]

pub mod collector;
pub mod logging;
pub mod options;
pub mod transformer;
