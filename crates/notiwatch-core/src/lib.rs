pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NotiwatchConfig;
pub use error::{NotiwatchError, Result};
pub use events::{PostedNotification, RawEvent, RemovedNotification, WatchEvent};
pub use types::*;
