//! Script engine capability set (spec §4.4).

pub mod adapter;

pub use adapter::Engine;
