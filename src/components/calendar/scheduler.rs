use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::models::{CalendarEvent, MatchedEvent};
use super::time::{is_same_bucket, next_boundary, Interval};
use super::{EventSource, ReminderSink};

/// Result of a single fetch/match/display cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The data source failed, nothing was shown
    FetchFailed,
    /// No event starts in the current interval
    NoMeetings,
    /// The sink was called with this many events
    Displayed(usize),
}

/// Polls the calendar on interval boundaries and shows meetings that start now
pub struct CalendarService<S, R, C> {
    source: S,
    sink: R,
    clock: C,
    interval: Interval,
}

impl<S, R, C> CalendarService<S, R, C>
where
    S: EventSource,
    R: ReminderSink,
    C: Clock,
{
    pub fn new(source: S, sink: R, clock: C, interval: Interval) -> Self {
        Self {
            source,
            sink,
            clock,
            interval,
        }
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Sleep until the next interval boundary and return it
    pub async fn wait_until_next_interval(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        let boundary = next_boundary(now, self.interval);
        // Boundary is strictly after now, so this never underflows
        let wait = (boundary - now).to_std().unwrap_or_default();
        debug!("Sleeping {:?} until {}", wait, boundary);
        sleep(wait).await;
        boundary
    }

    /// Run one cycle against the clock's current instant
    pub async fn fetch_and_display(&self) -> CycleOutcome {
        self.run_cycle(self.clock.now()).await
    }

    /// Loop forever, one cycle per interval, until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting calendar event watcher (interval {})", self.interval);

        loop {
            let boundary = tokio::select! {
                boundary = self.wait_until_next_interval() => boundary,
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping calendar event watcher");
                    break;
                }
            };

            // A timer firing a hair early on the wall clock must not land in the previous bucket
            let now = self.clock.now().max(boundary);
            self.run_cycle(now).await;
        }

        info!("Calendar event watcher stopped");
    }

    async fn run_cycle(&self, now: DateTime<Utc>) -> CycleOutcome {
        let events = match self.source.fetch_events().await {
            Ok(events) => events,
            Err(e) => {
                error!("Error fetching calendar events: {}", e);
                return CycleOutcome::FetchFailed;
            }
        };
        debug!("Fetched {} events", events.len());

        let matched: Vec<MatchedEvent> = events
            .into_iter()
            .filter_map(|raw| match CalendarEvent::try_from(raw.clone()) {
                Ok(event) => Some(event),
                Err(reason) => {
                    warn!("Skipping malformed event ({}): {:?}", reason, raw);
                    None
                }
            })
            .filter(|event| is_same_bucket(event.start, now, self.interval))
            .map(MatchedEvent::from)
            .collect();

        if matched.is_empty() {
            info!("No meetings found at this time.");
            return CycleOutcome::NoMeetings;
        }

        for event in &matched {
            info!("Meeting found: {} at {}", event.title, event.start.format("%H:%M"));
        }

        if let Err(e) = self.sink.show_meeting_reminder(&matched).await {
            error!("Failed to show meeting reminder: {}", e);
        }

        CycleOutcome::Displayed(matched.len())
    }
}
