use super::time::parse_event_time;
use crate::error::SkipReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Calendar event as delivered by the data source, every field optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub subject: Option<String>,
    pub start: Option<RawDateTime>,
    pub location: Option<RawLocation>,
    pub online_meeting: Option<RawOnlineMeeting>,
    pub web_link: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDateTime {
    pub date_time: Option<String>,
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocation {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOnlineMeeting {
    pub join_url: Option<String>,
}

impl RawEvent {
    /// Shorthand used by data sources and tests
    pub fn new(subject: &str, start: &str) -> Self {
        Self {
            subject: Some(subject.to_string()),
            start: Some(RawDateTime {
                date_time: Some(start.to_string()),
                time_zone: Some("UTC".to_string()),
            }),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, name: &str) -> Self {
        self.location = Some(RawLocation {
            display_name: Some(name.to_string()),
        });
        self
    }

    pub fn with_web_link(mut self, url: &str) -> Self {
        self.web_link = Some(url.to_string());
        self
    }

    pub fn with_join_url(mut self, url: &str) -> Self {
        self.online_meeting = Some(RawOnlineMeeting {
            join_url: Some(url.to_string()),
        });
        self
    }
}

/// Validated calendar event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub location: Option<String>,
    pub join_url: Option<String>,
    pub web_link: Option<String>,
}

impl TryFrom<RawEvent> for CalendarEvent {
    type Error = SkipReason;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let start_str = raw
            .start
            .and_then(|s| s.date_time)
            .ok_or(SkipReason::MissingStart)?;
        let start = parse_event_time(&start_str)?;
        let title = raw.subject.ok_or(SkipReason::MissingSubject)?;

        let location = raw
            .location
            .and_then(|l| l.display_name)
            .filter(|name| !name.trim().is_empty());
        let join_url = raw
            .online_meeting
            .and_then(|m| m.join_url)
            .filter(|url| !url.trim().is_empty());
        let web_link = raw.web_link.filter(|url| !url.trim().is_empty());

        Ok(Self {
            title,
            start,
            location,
            join_url,
            web_link,
        })
    }
}

/// What the reminder shows for a meeting starting now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub link: Option<String>,
}

impl From<CalendarEvent> for MatchedEvent {
    fn from(event: CalendarEvent) -> Self {
        Self {
            title: event.title,
            start: event.start,
            link: event.join_url.or(event.location).or(event.web_link),
        }
    }
}
