pub mod assertion;
pub mod config;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod journey;
pub mod pipeline;
pub mod resolution;
pub mod runner;
pub mod session;

pub use waypoint_common::backend;
pub use waypoint_common::locator;
