pub mod clock;
pub mod error;
pub mod executor;
pub mod recurrence;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use error::{Result, ScheduleError};
pub use executor::{OverrideCallback, ScheduleExecutor, ScheduleState};
pub use recurrence::{next_occurrence, weekday_index};
