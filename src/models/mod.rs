mod duration;
mod session;

pub use duration::{HmsDuration, HmsParseError};
pub use session::{SessionStatus, WorkSession};
