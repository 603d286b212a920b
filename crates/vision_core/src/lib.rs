//! vision_core: detector output post-filtering and box overlays.

pub mod overlay;
pub mod postprocess;

pub mod prelude {
    pub use crate::overlay::*;
    pub use crate::postprocess::*;
}
