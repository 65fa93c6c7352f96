//! Cron timers and schedule synchronization
//!
//! The admin expresses schedules as `HH:MM` times of day; this module turns
//! them into cron-backed timers. [`ScheduleSync::tick`] recomputes the wanted
//! schedule from the current settings snapshot and re-arms the timers only
//! when the composite schedule key actually changed, so an untouched settings
//! save never perturbs a running timer.
//!
//! A fixed weekly cleanup timer (Sunday midnight) runs independently of the
//! sync loop and is never re-armed.

use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AutomationSettings;
use crate::error::{Error, Result};

/// Which admin-configured timer a time-of-day string belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Collect,
    Review,
}

impl TimerKind {
    /// Safe fallback applied when the configured time is unparseable
    fn default_time(&self) -> (u32, u32) {
        match self {
            Self::Collect => (2, 0),
            Self::Review => (3, 0),
        }
    }
}

/// A fired timer, delivered to the service loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    CollectDue,
    ReviewDue,
    CleanupDue,
}

/// A daily time-of-day schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronDescriptor {
    pub hour: u32,
    pub minute: u32,
}

impl CronDescriptor {
    /// Five-field cron form, `M H * * *`
    pub fn expression(&self) -> String {
        format!("{} {} * * *", self.minute, self.hour)
    }

    /// `HH:MM` form for logs and notifications
    pub fn label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    /// The backing schedule (the cron crate wants a seconds field)
    fn schedule(&self) -> Result<Schedule> {
        let expression = format!("0 {} {} * * *", self.minute, self.hour);
        Schedule::from_str(&expression).map_err(|e| Error::Schedule(e.to_string()))
    }
}

/// Parse an `HH:MM` time of day, falling back to the kind's default.
///
/// Invalid input is a logged fallback rather than an error: a typo in the
/// admin settings must not take the whole scheduler down.
pub fn parse_time_of_day(kind: TimerKind, input: &str) -> CronDescriptor {
    let parsed = input.split_once(':').and_then(|(h, m)| {
        let hour: u32 = h.trim().parse().ok()?;
        let minute: u32 = m.trim().parse().ok()?;
        (hour < 24 && minute < 60).then_some((hour, minute))
    });

    let (hour, minute) = match parsed {
        Some(time) => time,
        None => {
            warn!(kind = ?kind, input, "Unparseable schedule time, using default");
            kind.default_time()
        }
    };

    CronDescriptor { hour, minute }
}

/// The pair of admin-configured timers, compared by composite key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSnapshot {
    pub collect: CronDescriptor,
    pub review: CronDescriptor,
}

impl ScheduleSnapshot {
    pub fn from_settings(automation: &AutomationSettings) -> Self {
        Self {
            collect: parse_time_of_day(TimerKind::Collect, &automation.collect_time),
            review: parse_time_of_day(TimerKind::Review, &automation.review_time),
        }
    }

    /// Composite change-detection key
    pub fn key(&self) -> String {
        format!("{}|{}", self.collect.expression(), self.review.expression())
    }
}

/// Keeps the running timers in line with the settings snapshot
pub struct ScheduleSync {
    events: mpsc::Sender<ScheduleEvent>,
    shutdown: watch::Receiver<bool>,
    current: Option<ScheduleSnapshot>,
    handles: Vec<JoinHandle<()>>,
}

impl ScheduleSync {
    pub fn new(events: mpsc::Sender<ScheduleEvent>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            events,
            shutdown,
            current: None,
            handles: Vec::new(),
        }
    }

    /// Reconcile the timers with the given settings.
    ///
    /// Returns `true` when the timers were (re-)armed, `false` when the
    /// schedule was unchanged.
    pub fn tick(&mut self, automation: &AutomationSettings) -> Result<bool> {
        let wanted = ScheduleSnapshot::from_settings(automation);

        if self.current.map(|s| s.key()) == Some(wanted.key()) {
            debug!(key = %wanted.key(), "Schedule unchanged");
            return Ok(false);
        }

        self.stop();
        self.handles.push(spawn_cron_timer(
            wanted.collect.schedule()?,
            ScheduleEvent::CollectDue,
            self.events.clone(),
            self.shutdown.clone(),
        ));
        self.handles.push(spawn_cron_timer(
            wanted.review.schedule()?,
            ScheduleEvent::ReviewDue,
            self.events.clone(),
            self.shutdown.clone(),
        ));

        info!(
            collect = %wanted.collect.label(),
            review = %wanted.review.label(),
            "Schedule timers armed"
        );
        self.current = Some(wanted);
        Ok(true)
    }

    /// Arm the fixed weekly cleanup timer (Sunday midnight)
    pub fn arm_cleanup(&mut self) -> Result<()> {
        let schedule = weekly_cleanup_schedule()?;
        self.handles.push(spawn_cron_timer(
            schedule,
            ScheduleEvent::CleanupDue,
            self.events.clone(),
            self.shutdown.clone(),
        ));
        Ok(())
    }

    /// Abort all running timers
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for ScheduleSync {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `0 0 * * 0` semantics in the six-field form the cron crate expects
fn weekly_cleanup_schedule() -> Result<Schedule> {
    Schedule::from_str("0 0 0 * * Sun").map_err(|e| Error::Schedule(e.to_string()))
}

fn spawn_cron_timer(
    schedule: Schedule,
    event: ScheduleEvent,
    events: mpsc::Sender<ScheduleEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(event = ?event, wait_secs = wait.as_secs(), "Timer sleeping until next occurrence");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => {
                    debug!(event = ?event, "Timer shut down");
                    break;
                }
            }
        }
    })
}
