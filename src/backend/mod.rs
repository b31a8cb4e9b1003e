//! Backend abstraction layer
//!
//! Traits for the external collaborators of a render pass, the data passed
//! to them, and a recording implementation for headless use and tests.

pub mod recording;
pub mod traits;
pub mod types;

pub use recording::*;
pub use traits::*;
pub use types::*;
