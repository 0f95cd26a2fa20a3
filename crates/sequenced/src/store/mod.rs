mod interface;
mod lock;
mod memory;

pub use interface::*;
pub use memory::*;
