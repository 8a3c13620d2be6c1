//! Tests for the engine
//!
//! Organized by feature area

mod driver_tests;
mod helpers;
mod scheduler_tests;
