//! Waiter - Poll a resource until it reaches a target status
//!
//! Bounded polling at a fixed interval with a deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::provider::{ProviderError, ProviderResult};

/// Status observed by one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Resource exists with the given status
    Found(String),
    /// Resource does not exist (anymore)
    Missing,
}

impl Status {
    pub fn found(status: impl Into<String>) -> Self {
        Status::Found(status.into())
    }
}

/// Bounded poll-until-state-reached waiter
#[derive(Debug, Clone)]
pub struct Waiter {
    pub description: String,
    pub targets: Vec<String>,
    pub failures: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Waiter {
    /// Target matched by `Status::Missing`
    pub const GONE: &'static str = "<gone>";

    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            targets: Vec::new(),
            failures: Vec::new(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(20 * 60),
        }
    }

    pub fn until(mut self, targets: &[&str]) -> Self {
        self.targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Wait until the resource disappears
    pub fn until_gone(self) -> Self {
        self.until(&[Self::GONE])
    }

    pub fn failing_on(mut self, failures: &[&str]) -> Self {
        self.failures = failures.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn is_target(&self, status: &Status) -> bool {
        match status {
            Status::Found(s) => self.targets.iter().any(|t| t.eq_ignore_ascii_case(s)),
            Status::Missing => self.targets.iter().any(|t| t == Self::GONE),
        }
    }

    fn is_failure(&self, status: &str) -> bool {
        self.failures.iter().any(|f| f.eq_ignore_ascii_case(status))
    }

    /// Poll `read_status` until the status enters the target set
    ///
    /// Returns the final status. Fails as soon as a failure status is seen,
    /// when the resource disappears while a status is expected, or when the
    /// timeout elapses.
    pub async fn wait<F, Fut>(&self, mut read_status: F) -> ProviderResult<Status>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<Status>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let status = read_status().await?;
            log::debug!(
                "waiting for {}: attempt {} observed {:?}",
                self.description,
                attempts,
                status
            );

            if self.is_target(&status) {
                log::info!("{} reached {:?}", self.description, status);
                return Ok(status);
            }

            match &status {
                Status::Found(s) if self.is_failure(s) => {
                    return Err(ProviderError::new(format!(
                        "{} entered failure status '{}'",
                        self.description, s
                    )));
                }
                Status::Missing => {
                    return Err(ProviderError::new(format!(
                        "{} disappeared while waiting for {}",
                        self.description,
                        self.targets.join(", ")
                    )));
                }
                Status::Found(_) => {}
            }

            if Instant::now() + self.interval > deadline {
                return Err(ProviderError::new(format!(
                    "timeout after {:?} waiting for {} to reach {} (last status {:?})",
                    self.timeout,
                    self.description,
                    self.targets.join(", "),
                    status
                )));
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(statuses: Vec<Status>) -> impl FnMut() -> std::future::Ready<ProviderResult<Status>> {
        let mut calls = 0usize;
        move || {
            let i = calls;
            calls += 1;
            let status = statuses
                .get(i)
                .or(statuses.last())
                .cloned()
                .unwrap_or(Status::Missing);
            std::future::ready(Ok(status))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_when_target_reached() {
        let waiter = Waiter::new("instance web001")
            .until(&["running"])
            .interval(Duration::from_secs(5));

        let status = waiter
            .wait(sequence(vec![
                Status::found("pending"),
                Status::found("pending"),
                Status::found("RUNNING"),
            ]))
            .await
            .unwrap();

        assert_eq!(status, Status::found("RUNNING"));
    }

    #[tokio::test(start_paused = true)]
    async fn fails_on_failure_status() {
        let waiter = Waiter::new("db")
            .until(&["available"])
            .failing_on(&["failed"]);

        let err = waiter
            .wait(sequence(vec![Status::found("creating"), Status::found("failed")]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failure status 'failed'"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let waiter = Waiter::new("volume disk01")
            .until(&["available"])
            .interval(Duration::from_secs(10))
            .timeout(Duration::from_secs(60));

        let start = Instant::now();
        let err = waiter
            .wait(sequence(vec![Status::found("in-use")]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("timeout"));
        assert!(start.elapsed() <= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn gone_target_matches_missing() {
        let waiter = Waiter::new("private lan").until_gone();

        let status = waiter
            .wait(sequence(vec![Status::found("deleting"), Status::Missing]))
            .await
            .unwrap();

        assert_eq!(status, Status::Missing);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_is_an_error_unless_targeted() {
        let waiter = Waiter::new("router").until(&["available"]);

        let err = waiter.wait(sequence(vec![Status::Missing])).await.unwrap_err();

        assert!(err.to_string().contains("disappeared"));
    }

    #[tokio::test(start_paused = true)]
    async fn read_errors_are_propagated() {
        let waiter = Waiter::new("router").until(&["available"]);

        let err = waiter
            .wait(|| async { Err(ProviderError::new("api down")) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "api down");
    }
}
