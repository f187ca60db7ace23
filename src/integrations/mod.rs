//! Collaborators outside the crate: the compliance backend and the rasterizer.

pub mod http_client {
    pub use crate::http_client::*;
}

pub mod rasterizer {
    pub use crate::screenshot::{RasterOptions, Rasterizer};
}
