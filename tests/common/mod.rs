pub mod builders;
pub mod doubles;
pub mod harness;
pub mod strategies;

pub use builders::*;
pub use doubles::*;
pub use harness::*;
