//! Integration tests for the sweep engine
//!
//! Tests are organized by topic:
//! - `combinations` - Combination matrix construction per sampling type
//! - `kernel` - Per-sample probe / solve / retry protocol and output harvest
//! - `aggregation` - Rank-ordered gathering and writer hand-off checks
//! - `sweeps` - Single-round sweeps on one worker and on a thread group
//! - `recursive` - Multi-round resampling until enough samples solve
//!
//! `test_model` holds the in-memory model shared by all of them.

mod kernel;
