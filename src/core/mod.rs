pub mod adaptive;
pub mod cancel;
pub mod error;
pub mod record;
pub mod tier;

pub use adaptive::*;
pub use cancel::*;
pub use error::*;
pub use record::*;
pub use tier::*;
