pub mod expand;
pub mod matcher;
pub mod produce;

pub use expand::*;
pub use matcher::*;
pub use produce::*;
