pub mod violation;

pub use violation::{PositionUpdate, ViolationMonitor, DEFAULT_COOLDOWN, DEFAULT_MIN_MOVEMENT_M};
