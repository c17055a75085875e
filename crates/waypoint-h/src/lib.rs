pub mod backend;
pub mod cdp;
pub mod network;
pub mod query;
pub mod recorder;

pub use backend::HeadlessBackend;
