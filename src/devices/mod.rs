//! Device implementations

pub mod tfmini;

pub use tfmini::TfMiniDriver;
