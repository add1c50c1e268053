use chrono::{DateTime, Utc};

pub type Id = uuid::Uuid;
pub type Time = DateTime<Utc>;

/// Source of the current time, swapped out in tests for a fixed instant
pub trait Clock: Send + Sync {
	/// Gets the current time
	fn now(&self) -> Time {
		Utc::now()
	}
}

/// Wall clock
pub struct SystemClock;

impl Clock for SystemClock {}
