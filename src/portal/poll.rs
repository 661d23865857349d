//! Bounded polling with a growing interval and a settle confirmation.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Result of one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// Terminal-looking value. Must be confirmed after the settle delay.
    Ready(T),
    /// Not there yet; carries the latest observation if any.
    Pending(Option<T>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Polled<T> {
    Ready(T),
    TimedOut(Option<T>),
}

#[derive(Debug, Clone, Copy)]
pub struct PollSpec {
    pub interval: Duration,
    pub max_interval: Duration,
    pub ceiling: Duration,
    /// Delay before the confirming read. Zero disables confirmation.
    pub settle: Duration,
}

impl PollSpec {
    pub fn new(interval: Duration, ceiling: Duration) -> Self {
        Self {
            interval,
            max_interval: interval.saturating_mul(4),
            ceiling,
            settle: Duration::ZERO,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(1.5).min(self.max_interval).max(self.interval)
    }
}

/// Poll `probe` until it reports the same `Ready` value twice in a row across
/// the settle delay, or the ceiling elapses.
///
/// The ceiling is checked between probes, so one slow probe can overrun it by
/// its own duration.
pub async fn poll_until<T, F, Fut>(spec: PollSpec, mut probe: F) -> Polled<T>
where
    T: PartialEq + Clone,
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<T>>,
{
    let deadline = Instant::now() + spec.ceiling;
    let mut interval = spec.interval;
    let mut last: Option<T> = None;

    loop {
        match probe().await {
            Probe::Ready(value) => {
                if spec.settle.is_zero() {
                    return Polled::Ready(value);
                }
                sleep(spec.settle).await;
                match probe().await {
                    Probe::Ready(again) if again == value => return Polled::Ready(again),
                    Probe::Ready(other) => last = Some(other),
                    Probe::Pending(obs) => {
                        if obs.is_some() {
                            last = obs;
                        }
                    }
                }
            }
            Probe::Pending(obs) => {
                if obs.is_some() {
                    last = obs;
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Polled::TimedOut(last);
        }
        sleep(interval.min(deadline - now)).await;
        interval = spec.next_interval(interval);
    }
}

/// Poll a boolean condition. Returns whether it became true before the ceiling.
pub async fn wait_for<F, Fut>(interval: Duration, ceiling: Duration, mut cond: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let spec = PollSpec::new(interval, ceiling);
    let polled = poll_until(spec, || {
        let fut = cond();
        async move {
            if fut.await {
                Probe::Ready(())
            } else {
                Probe::Pending(None)
            }
        }
    })
    .await;
    matches!(polled, Polled::Ready(()))
}
