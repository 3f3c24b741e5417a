//! External service integrations.

pub mod analysis_client {
    pub use crate::analysis_client::*;
}

pub mod notifier {
    pub use crate::notifier::*;
}

pub mod material_store {
    pub use crate::material_store::*;
}
