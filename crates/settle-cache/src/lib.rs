pub mod dir;
pub mod ledger;
pub mod memory;
pub mod tiers;
pub mod traits;

pub use dir::*;
pub use ledger::*;
pub use memory::*;
pub use tiers::*;
pub use traits::*;
