//! Core trait definitions

mod probe;

pub use probe::HealthProbe;
