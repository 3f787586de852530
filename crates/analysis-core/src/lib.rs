pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use error::*;
pub use logging::init_tracing;
pub use traits::*;
pub use types::*;
