//! Binlog tests
//!
//! These tests verify:
//! - Log record encoding and strict decoding
//! - Frame layout, padding and in-memory frame iteration
//! - Binlog file append, point reads, batch reads and torn-tail scanning
//! - Segment naming and discovery
