mod controller;
pub mod events;
mod loops;
pub mod state;

pub use controller::MonitoringSession;
pub use events::{AlertSink, ChannelSink, ScoreReason, ScoreSink, ScoreUpdate, SessionEvent};
pub use state::SessionSnapshot;
