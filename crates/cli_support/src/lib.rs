pub mod common;
pub mod logging;

pub use common::*;
pub use logging::init_logging;
