pub mod hierarchy;
pub mod order;
pub mod set;

pub use hierarchy::*;
pub use order::*;
pub use set::*;
