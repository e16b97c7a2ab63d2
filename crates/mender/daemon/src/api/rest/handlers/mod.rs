//! API request handlers

mod fixes;
mod health;
mod interactions;
mod logs;
mod resources;
mod simulation;
mod tools;

pub use fixes::*;
pub use health::*;
pub use interactions::*;
pub use logs::*;
pub use resources::*;
pub use simulation::*;
pub use tools::*;
