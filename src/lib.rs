//! pulsemon: unified entry point for the pulsemon workspace.
//! This crate re-exports the internal crates so consumers can
//! `use pulsemon::engine::...`, `pulsemon::store::...`, etc., and hosts the
//! HTTP API served next to the engine.

pub mod api;

pub mod common {
    pub use ::common::*;
}
pub mod engine {
    pub use ::engine::*;
}
pub mod errors {
    pub use ::errors::*;
}
pub mod monitors {
    pub use ::monitors::*;
}
pub mod probe {
    pub use ::probe::*;
}
pub mod store {
    pub use ::store::*;
}
pub mod utils {
    pub use ::utils::*;
}
