mod counter;
mod interface;
mod scan;
mod sequence;
mod strategy;

pub use counter::*;
pub use interface::SequenceStrategy;
pub use scan::*;
pub use sequence::*;
pub use strategy::*;
