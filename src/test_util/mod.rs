//! Utilities for testing code that talks to the relay. They are used for the relay's own tests,
//!  and they are exported for application testing.

pub mod frames;
