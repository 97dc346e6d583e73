use crate::components::calendar::{MatchedEvent, ReminderSink};
use crate::config::Config;
use crate::error::{display_error, AppResult};
use async_trait::async_trait;
use chrono::Local;
use std::fmt::Write;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// File name of the generated reminder page
pub const OUTPUT_NAME: &str = "meeting-reminder.html";

const PAGE_HEAD: &str = r#"<html>
	<head>
		<meta charset="utf-8">
		<title>Meeting Reminder</title>
		<style>
			body {
				background: #d70036ff;
				color: white;
				display: flex;
				justify-content: center;
				align-items: center;
				margin: 0;
				flex-direction: column;
				min-height: 100%;
				gap: 20px;
				font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, 'Open Sans', 'Helvetica Neue', sans-serif;
			}
			a {
				color: yellow;
			}
			div.event {
				background: #0078D7;
				border: 2px solid white;
				padding: 1rem 3rem;
				border-radius: 10px;
			}
		</style>
	</head>
	<body>
		<h1>Meeting is starting now!</h1>"#;

const PAGE_TAIL: &str = "
	</body>
</html>";

/// Shows reminders as an HTML page opened in a browser
#[derive(Debug, Clone)]
pub struct BrowserReminder {
    browser_path: Option<String>,
    output_dir: PathBuf,
    open_dir: PathBuf,
}

impl BrowserReminder {
    pub fn new(browser_path: Option<String>, output_dir: PathBuf, open_dir: PathBuf) -> Self {
        Self {
            browser_path,
            output_dir,
            open_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.browser_path.clone(),
            config.output_dir.clone(),
            config.open_dir.clone(),
        )
    }

    /// Path the page is written to
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_NAME)
    }

    /// Path handed to the browser, may differ from the output path (e.g. under WSL)
    pub fn open_path(&self) -> PathBuf {
        self.open_dir.join(OUTPUT_NAME)
    }

    fn open(&self) -> AppResult<()> {
        let target = self.open_path();
        match &self.browser_path {
            Some(browser) => {
                // Fire and forget; tokio reaps the launcher once it exits
                Command::new(browser)
                    .arg(&target)
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map_err(|e| display_error(&format!("Failed to launch {}: {}", browser, e)))?;
            }
            None => {
                webbrowser::open(&target.to_string_lossy())
                    .map_err(|e| display_error(&format!("Failed to open browser: {}", e)))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReminderSink for BrowserReminder {
    async fn show_meeting_reminder(&self, events: &[MatchedEvent]) -> AppResult<()> {
        let html = render_page(events);

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| display_error(&format!("Failed to create {}: {}", self.output_dir.display(), e)))?;
        let path = self.output_path();
        tokio::fs::write(&path, html)
            .await
            .map_err(|e| display_error(&format!("Failed to write {}: {}", path.display(), e)))?;

        info!("Opening meeting reminder for {} event(s)", events.len());
        self.open()
    }
}

/// Render the reminder page for a batch of events
pub fn render_page(events: &[MatchedEvent]) -> String {
    let mut html = String::from(PAGE_HEAD);

    for event in events {
        let time = event.start.with_timezone(&Local).format("%H:%M");
        let _ = write!(
            html,
            "
		<div class=\"event\">
			<h2>{}</h2>
			<h3>Start Time: {}</h3>",
            escape_html(&event.title),
            time
        );
        if let Some(link) = &event.link {
            let link = escape_html(link);
            let _ = write!(html, "\n\t\t\t<a href=\"{}\">{}</a>", link, link);
        }
        html.push_str("\n\t\t</div>");
    }

    html.push_str(PAGE_TAIL);
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
