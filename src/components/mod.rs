// Export components
pub mod calendar;
pub mod microsoft_graph;
pub mod reminder_ui;

pub use calendar::CalendarService;
pub use microsoft_graph::{GraphCalendar, TokenManager};
pub use reminder_ui::BrowserReminder;
