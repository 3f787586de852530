pub mod analyzer;
pub mod indicators;
pub mod signals;


pub use analyzer::*;
pub use indicators::*;
pub use signals::*;
