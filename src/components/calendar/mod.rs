mod clock;
pub mod models;
mod scheduler;
pub mod time;

pub use clock::{Clock, FixedClock, SystemClock};
pub use models::{CalendarEvent, MatchedEvent, RawEvent};
pub use scheduler::{CalendarService, CycleOutcome};
pub use time::{is_same_bucket, next_boundary, parse_event_time, truncate, Interval};

use crate::error::AppResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Where calendar events come from
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch every event that may start today
    async fn fetch_events(&self) -> AppResult<Vec<RawEvent>>;
}

/// Where matched events are shown
#[async_trait]
pub trait ReminderSink: Send + Sync {
    /// Show all meetings starting in the current interval at once
    async fn show_meeting_reminder(&self, events: &[MatchedEvent]) -> AppResult<()>;
}

#[async_trait]
impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    async fn fetch_events(&self) -> AppResult<Vec<RawEvent>> {
        (**self).fetch_events().await
    }
}

#[async_trait]
impl<T: ReminderSink + ?Sized> ReminderSink for Arc<T> {
    async fn show_meeting_reminder(&self, events: &[MatchedEvent]) -> AppResult<()> {
        (**self).show_meeting_reminder(events).await
    }
}
