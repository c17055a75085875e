pub mod definition;
pub mod fixtures;
pub mod loader;
pub mod schema;

pub use definition::{
    Check, FailurePolicy, Journey, Predicate, Settle, Step, StepAction,
};
pub use fixtures::{FixtureError, Fixtures};
pub use loader::{JourneyLoader, LoaderError};
pub use schema::{Validatable, ValidationError};
