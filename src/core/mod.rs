// Domain-layer modules and shared errors/models
pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod reconcile {
    pub use crate::reconcile::*;
}

pub mod phase {
    pub use crate::phase::*;
}

pub mod errors {
    pub use crate::errors::*;
}
