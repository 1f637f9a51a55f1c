//! Route handlers, one module per resource.

pub mod control;
pub mod keys;
pub mod state;
pub mod stops;
