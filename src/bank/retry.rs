use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

/// Bound and backoff of the optimistic concurrency retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
	/// Attempts in total, the first one included
	pub max_attempts: u32,
	/// Pause after the first conflict, grows linearly with each further one
	pub backoff: Duration,
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, backoff: Duration) -> Self {
		RetryPolicy {
			max_attempts: max_attempts.max(1),
			backoff,
		}
	}

	/// Pause before the attempt following `failed_attempt`
	pub fn delay(&self, failed_attempt: u32) -> Duration {
		self.backoff * failed_attempt
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn at_least_one_attempt() {
		assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
		assert_eq!(RetryPolicy::default().max_attempts, 3);
	}

	#[test]
	fn linear_backoff() {
		let policy = RetryPolicy::new(3, Duration::from_millis(10));
		assert_eq!(policy.delay(1), Duration::from_millis(10));
		assert_eq!(policy.delay(2), Duration::from_millis(20));
	}
}
