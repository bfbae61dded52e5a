//! Bounded retry with a caller-supplied error classifier.
//!
//! Gas estimation and transaction submission share this loop. Each caller
//! decides per error whether another attempt can help, should happen right
//! away, or is pointless.

use keeper_config::RetryConfig;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
	/// Sleep for the configured delay, then try again.
	Retry,
	/// Try again without sleeping.
	RetryImmediately,
	/// Stop and surface this error.
	Abort,
}

/// Attempt budget and delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub max_attempts: u32,
	pub delay: Duration,
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, delay: Duration) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			delay,
		}
	}
}

impl From<&RetryConfig> for RetryPolicy {
	fn from(config: &RetryConfig) -> Self {
		Self::new(config.max_retries, config.delay())
	}
}

/// Why the retry loop gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
	/// The classifier refused to retry.
	#[error("aborted on attempt {attempt}: {error}")]
	Aborted { attempt: u32, error: E },
	/// Every attempt failed.
	#[error("failed after {attempts} attempts: {error}")]
	Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
	/// The last error seen.
	pub fn into_inner(self) -> E {
		match self {
			RetryError::Aborted { error, .. } | RetryError::Exhausted { error, .. } => error,
		}
	}

	/// Number of attempts made before giving up.
	pub fn attempts(&self) -> u32 {
		match self {
			RetryError::Aborted { attempt, .. } => *attempt,
			RetryError::Exhausted { attempts, .. } => *attempts,
		}
	}
}

/// Runs `operation` until it succeeds, the classifier aborts, or the policy's
/// attempt budget is spent.
///
/// `operation` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut, C>(
	policy: &RetryPolicy,
	what: &str,
	mut operation: F,
	classify: C,
) -> Result<T, RetryError<E>>
where
	F: FnMut(u32) -> Fut,
	Fut: Future<Output = Result<T, E>>,
	C: Fn(&E) -> RetryDecision,
	E: fmt::Display,
{
	let mut attempt = 1;
	loop {
		match operation(attempt).await {
			Ok(value) => return Ok(value),
			Err(error) => {
				let decision = classify(&error);
				if decision == RetryDecision::Abort {
					tracing::warn!(%what, attempt, error = %error, "Not retrying");
					return Err(RetryError::Aborted { attempt, error });
				}
				if attempt >= policy.max_attempts {
					tracing::warn!(%what, attempts = attempt, error = %error, "Retries exhausted");
					return Err(RetryError::Exhausted {
						attempts: attempt,
						error,
					});
				}

				tracing::debug!(
					%what,
					attempt,
					max_attempts = policy.max_attempts,
					error = %error,
					"Attempt failed, retrying"
				);
				if decision == RetryDecision::Retry && !policy.delay.is_zero() {
					tokio::time::sleep(policy.delay).await;
				}
				attempt += 1;
			},
		}
	}
}
