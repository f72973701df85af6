// Core business logic lives here - the brain of the operation

pub mod checkpoint;
pub mod error;
pub mod events;
pub mod format;
pub mod notify;
pub mod poller;
pub mod resource;
pub mod settings;
pub mod validation;

pub use checkpoint::CheckpointTracker;
pub use error::Error;
pub use events::{EventBus, NotificationEvent};
pub use notify::{
    BadgeSink, LogBadge, NotificationKind, NotificationRecord, NotificationStore,
    BADGE_COLOR, MAX_NOTIFICATIONS,
};
pub use poller::{Poller, PollerHandle, UpdateSource};
pub use resource::ResourceType;
pub use settings::{NotificationSettings, Settings};

/// Result type alias because typing Result<T, Error> everywhere is tedious
pub type Result<T> = std::result::Result<T, Error>;
