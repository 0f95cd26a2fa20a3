mod config;
mod entity;
mod error;
mod generator;
mod registry;
mod resolver;
mod sequencer;
mod spec;
mod store;
mod value;

pub use crate::config::*;
pub use crate::entity::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::registry::*;
pub use crate::resolver::*;
pub use crate::sequencer::*;
pub use crate::spec::*;
pub use crate::store::*;
pub use crate::value::*;
