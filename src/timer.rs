//! Recurring poll timer for the acquisition loop.
//!
//! The timer owns a tokio interval only while it is active. Ticks are produced
//! lazily when [`PollTimer::tick`] is awaited, so once [`PollTimer::cancel`]
//! returns no tick from the cancelled run can be observed.

use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Default delay between two poll requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Smallest accepted poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A cancellable recurring timer.
///
/// The first tick of a run fires one full period after [`start`](Self::start).
#[derive(Debug)]
pub struct PollTimer {
    /// Delay between ticks
    period: Duration,
    /// Active interval, `None` while cancelled
    interval: Option<Interval>,
}

impl PollTimer {
    /// Create an inactive timer.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use ert_acquire::timer::PollTimer;
    ///
    /// let timer = PollTimer::new(Duration::from_millis(1500));
    /// assert!(!timer.is_active());
    /// ```
    pub fn new(period: Duration) -> Self {
        PollTimer {
            period: period.max(MIN_POLL_INTERVAL),
            interval: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start a new run, replacing any active one.
    pub fn start(&mut self) {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    /// Stop the current run. Safe to call when inactive.
    pub fn cancel(&mut self) {
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Never completes while the timer is inactive.
    ///
    /// Cancel-safe: dropping the future before it completes loses no tick.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use ert_acquire::timer::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1500ms").unwrap(), Duration::from_millis(1500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    if let Some(num) = src.strip_suffix("ms") {
        let millis: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds: {}", num))?;
        return Ok(Duration::from_millis(millis));
    }

    if let Some(num) = src.strip_suffix('h') {
        let hours: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid hours: {}", num))?;
        return Ok(Duration::from_secs(hours * 3600));
    }

    if let Some(num) = src.strip_suffix('m') {
        let minutes: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid minutes: {}", num))?;
        return Ok(Duration::from_secs(minutes * 60));
    }

    if let Some(num) = src.strip_suffix('s') {
        let secs: u64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid seconds: {}", num))?;
        return Ok(Duration::from_secs(secs));
    }

    let secs: u64 = src
        .parse()
        .map_err(|_| format!("invalid duration: {}", src))?;
    Ok(Duration::from_secs(secs))
}

/// Parse a poll interval, rejecting values below [`MIN_POLL_INTERVAL`].
pub fn parse_poll_interval(src: &str) -> Result<Duration, String> {
    let interval = parse_duration(src)?;
    if interval < MIN_POLL_INTERVAL {
        return Err(format!(
            "poll interval must be at least {}ms",
            MIN_POLL_INTERVAL.as_millis()
        ));
    }
    Ok(interval)
}
