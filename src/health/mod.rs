pub mod classify;
pub mod transition;
pub mod types;

pub use classify::classify;
pub use transition::TransitionDetector;
