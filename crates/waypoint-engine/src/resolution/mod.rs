pub mod resolver;

pub use resolver::{LocatorResolver, Resolution};
