pub mod token;

pub use token::{StoredToken, TokenManager};

use crate::components::calendar::{Clock, EventSource, RawEvent};
use crate::error::{fetch_error, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Calendar view endpoint of the signed-in user
pub const CALENDAR_VIEW_URL: &str = "https://graph.microsoft.com/v1.0/me/calendar/calendarView";

/// One page of a calendarView response
#[derive(Debug, Deserialize)]
struct CalendarViewPage {
    value: Option<Vec<serde_json::Value>>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Microsoft Graph calendar as an event source
pub struct GraphCalendar<C> {
    tokens: Arc<TokenManager>,
    client: Client,
    clock: C,
}

impl<C: Clock> GraphCalendar<C> {
    pub fn new(tokens: Arc<TokenManager>, clock: C) -> Self {
        Self {
            tokens,
            client: Client::new(),
            clock,
        }
    }

    async fn fetch_page(&self, url: &str, access_token: &str) -> AppResult<CalendarViewPage> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header("Prefer", "outlook.timezone=\"UTC\"")
            .send()
            .await
            .map_err(|e| fetch_error(&format!("Failed to fetch events: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(fetch_error(&format!(
                "API request failed: HTTP {} - {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| fetch_error(&format!("Failed to parse events response: {}", e)))
    }
}

#[async_trait]
impl<C: Clock> EventSource for GraphCalendar<C> {
    async fn fetch_events(&self) -> AppResult<Vec<RawEvent>> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|e| fetch_error(&format!("Failed to get access token: {}", e)))?;

        let mut next = Some(calendar_view_url(self.clock.now())?.to_string());
        let mut events = Vec::new();

        while let Some(url) = next {
            let page = self.fetch_page(&url, &access_token).await?;
            let values = page
                .value
                .ok_or_else(|| fetch_error("Unexpected response format: no 'value' array"))?;

            events.extend(values.into_iter().filter_map(|value| {
                match serde_json::from_value::<RawEvent>(value.clone()) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!("Skipping undecodable event ({}): {}", e, value);
                        None
                    }
                }
            }));
            next = page.next_link;
        }

        debug!("Graph returned {} events", events.len());
        Ok(events)
    }
}

/// calendarView URL covering the UTC day containing `now`
pub fn calendar_view_url(now: DateTime<Utc>) -> AppResult<Url> {
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| fetch_error("Failed to compute start of day"))?
        .and_utc();
    let day_end = day_start + TimeDelta::days(1) - TimeDelta::seconds(1);

    let mut url = Url::parse(CALENDAR_VIEW_URL)
        .map_err(|e| fetch_error(&format!("Failed to parse URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("startDateTime", &day_start.to_rfc3339_opts(SecondsFormat::Secs, true))
        .append_pair("endDateTime", &day_end.to_rfc3339_opts(SecondsFormat::Secs, true))
        .append_pair("$select", "subject,start,location,onlineMeeting,webLink")
        .append_pair("$orderby", "start/dateTime");
    Ok(url)
}
