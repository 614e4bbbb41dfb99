//! Domain types for the governance pipeline.
//!
//! This module contains the core entities and value objects.

mod action;
mod audit;
mod interaction;
mod settings;
mod stats;
pub(crate) mod violation;

pub use action::*;
pub use audit::*;
pub use interaction::*;
pub use settings::*;
pub use stats::*;
pub use violation::*;
