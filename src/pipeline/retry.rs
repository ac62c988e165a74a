//! Retries for calls to the release host.
//!
//! Only [`ErrorClass::Transient`] failures are retried. Waits double from one
//! second up to [`MAX_BACKOFF`], and no wait runs past the deadline of the
//! whole sequence.

use crate::cli::RuntimeConfig;
use crate::error::{CliError, ErrorClass, PipelineError, Result};
use tokio::time::{Duration, Instant};

/// Longest single wait between attempts
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Default deadline for the whole retry sequence
const DEFAULT_DEADLINE: Duration = Duration::from_secs(1800);

/// Doubling waits, clipped to what is left before the deadline
struct Backoff {
    started: Instant,
    deadline: Instant,
    next: Duration,
}

impl Backoff {
    fn new(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + budget,
            next: Duration::from_secs(1),
        }
    }

    /// Next wait, or `None` once the deadline leaves no room for one
    fn next_wait(&mut self) -> Option<Duration> {
        let wait = self.next.min(self.deadline.saturating_duration_since(Instant::now()));
        self.next = (self.next * 2).min(MAX_BACKOFF);
        (!wait.is_zero()).then_some(wait)
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Run `operation` until it succeeds, fails for good, or time runs out.
///
/// `max_retries` counts retries after the first attempt, so 0 tries once.
/// Running out of time yields [`CliError::ExecutionFailed`] naming the last
/// failure; any other error is returned as the operation produced it.
pub async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    max_retries: u32,
    operation_name: &str,
    config: &RuntimeConfig,
    deadline: Option<Duration>,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(deadline.unwrap_or(DEFAULT_DEADLINE));
    let mut retries = 0;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    config.success_println(&format!(
                        "{operation_name} succeeded after {retries} retry(ies)"
                    ));
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let class = error.class();
        if class != ErrorClass::Transient {
            log::debug!("{operation_name} failed ({class}), not retrying: {error}");
            return Err(error);
        }
        if retries >= max_retries {
            config.error_println(&format!(
                "{operation_name} still failing after {} attempt(s)",
                retries + 1
            ));
            return Err(error);
        }

        let Some(wait) = backoff.next_wait() else {
            return Err(out_of_time(operation_name, retries + 1, &backoff, &error));
        };
        retries += 1;

        config.warning_println(&format!(
            "{operation_name} hit a {class} error (attempt {retries}/{}): {error}",
            max_retries + 1
        ));
        config.indent(&format!("Retrying in {:.1}s...", wait.as_secs_f64()));
        tokio::time::sleep(wait).await;
    }
}

fn out_of_time(
    operation_name: &str,
    attempts: u32,
    backoff: &Backoff,
    last: &PipelineError,
) -> PipelineError {
    CliError::ExecutionFailed {
        command: operation_name.to_string(),
        reason: format!(
            "gave up after {attempts} attempt(s) over {:.1}s, last error: {last}",
            backoff.elapsed().as_secs_f64()
        ),
    }
    .into()
}
