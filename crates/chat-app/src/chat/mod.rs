pub mod bridge;
pub mod controller;
pub mod events;
pub mod session;

pub use bridge::{EventBridge, EventPoster};
pub use controller::{ChatController, DrainOutcome};
pub use events::AppEvent;
pub use session::{
    SessionHandle, SessionState, SessionTransition, SessionTransitionRejection,
    SessionTransitionResult, StreamingSession,
};
