// Shared blocking HTTP helpers for the Wikipedia and OpenAI adapters

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, error, warn};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

pub(crate) fn agent(timeout: Duration, user_agent: Option<&str>) -> ureq::Agent {
    let builder = ureq::Agent::config_builder().timeout_global(Some(timeout));
    match user_agent {
        Some(user_agent) => builder.user_agent(user_agent).build().into(),
        None => builder.build().into(),
    }
}

/// Run `request_fn` up to `attempts` times, backing off exponentially
/// between attempts. Transport errors, 429 and 5xx responses are retried;
/// any other failure is returned immediately.
pub(crate) fn request_with_retry<F>(target: &str, attempts: u32, mut request_fn: F) -> Result<String>
where
    F: FnMut() -> Result<String, ureq::Error>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        debug!("HTTP request attempt {}/{} to {}", attempt, attempts, target);

        match request_fn() {
            Ok(response_text) => {
                debug!("Request succeeded on attempt {}", attempt);
                return Ok(response_text);
            }
            Err(error) => {
                let should_retry = match &error {
                    ureq::Error::StatusCode(status) => {
                        if *status == 429 || *status >= 500 {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, attempts
                            );
                            true
                        } else {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(anyhow!("Client error: HTTP {}", status));
                        }
                    }
                    ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_) => {
                        warn!(
                            "Transport error: {}, attempt {}/{}",
                            error, attempt, attempts
                        );
                        true
                    }
                    _ => {
                        warn!("Non-retryable error: {}", error);
                        false
                    }
                };

                if !should_retry {
                    return Err(anyhow!("Non-retryable error: {}", error));
                }

                last_error = Some(anyhow!("Request error: {}", error));

                if attempt < attempts {
                    let delay = backoff_delay(attempt);
                    debug!("Waiting {:?} before retry", delay);
                    std::thread::sleep(delay);
                }
            }
        }
    }

    error!("All retry attempts failed for request to {}", target);

    Err(last_error.unwrap_or_else(|| anyhow!("Request failed after retries")))
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(EXPONENTIAL_BACKOFF_BASE.pow(attempt.saturating_sub(1)) * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn client_errors_are_not_retried() {
        let mut calls = 0;
        let result = request_with_retry("test", 3, || {
            calls += 1;
            Err(ureq::Error::StatusCode(401))
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn success_is_returned_immediately() {
        let mut calls = 0;
        let result = request_with_retry("test", 3, || {
            calls += 1;
            Ok("body".to_string())
        });

        assert_eq!(result.expect("request should succeed"), "body");
        assert_eq!(calls, 1);
    }

    #[test]
    fn server_errors_are_retried_until_success() {
        let mut calls = 0;
        let result = request_with_retry("test", 2, || {
            calls += 1;
            if calls == 1 {
                Err(ureq::Error::StatusCode(503))
            } else {
                Ok("recovered".to_string())
            }
        });

        assert_eq!(result.expect("request should recover"), "recovered");
        assert_eq!(calls, 2);
    }
}
