// Core data models for Atelier
// These structs represent the domain entities

pub mod control;
pub mod order;
pub mod stage;

pub use control::*;
pub use order::*;
pub use stage::*;
