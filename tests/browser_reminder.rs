#![cfg(target_os = "linux")]

use chrono::Utc;
use meeting_reminder::components::calendar::{MatchedEvent, ReminderSink};
use meeting_reminder::components::BrowserReminder;
use std::fs;
use std::time::Duration;

/// Children of this process sitting in the zombie state
fn zombie_children() -> usize {
    let me = std::process::id().to_string();
    let Ok(entries) = fs::read_dir("/proc") else {
        return 0;
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().chars().all(|c| c.is_ascii_digit()))
        .filter_map(|entry| fs::read_to_string(entry.path().join("stat")).ok())
        .filter(|stat| {
            // "pid (comm) state ppid ...", comm may itself contain spaces or parens
            let Some(rest) = stat.rfind(')').map(|i| &stat[i + 1..]) else {
                return false;
            };
            let mut fields = rest.split_whitespace();
            fields.next() == Some("Z") && fields.next() == Some(me.as_str())
        })
        .count()
}

/// Launchers that exit right away must not pile up as zombies in a long-running process
#[tokio::test]
async fn test_exited_launchers_are_reaped() {
    let dir = tempfile::tempdir().unwrap();
    let reminder = BrowserReminder::new(
        Some("true".to_string()),
        dir.path().to_path_buf(),
        dir.path().to_path_buf(),
    );
    let events = vec![MatchedEvent {
        title: "Standup".to_string(),
        start: Utc::now(),
        link: None,
    }];

    for _ in 0..3 {
        reminder.show_meeting_reminder(&events).await.unwrap();
    }

    // Reaping happens in the background, give it a moment
    let mut zombies = zombie_children();
    for _ in 0..50 {
        if zombies == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        zombies = zombie_children();
    }
    assert_eq!(zombies, 0, "zombie children left behind");
}
