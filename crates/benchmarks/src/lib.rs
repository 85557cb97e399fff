//! This crate only hosts the criterion benchmarks of the matching engine.
