pub mod backend;
pub mod error;
pub mod locator;

pub use backend::{
    ActionKind, Backend, ElementHandle, LaunchOptions, NavigationResult, Viewport,
};
pub use error::backend_error::BackendError;
pub use locator::{Locator, LocatorParseError};
