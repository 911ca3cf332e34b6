//! Test modules for the processing pipeline
//!
//! All suites run on a paused clock, so windows, deadlines and retry delays
//! elapse instantly while keeping their relative order.

mod helpers;
mod retry;
