//! Notification templates for event and task assignments.
//!
//! Pure rendering: domain payloads arrive as loosely-shaped JSON from the
//! queueing endpoints, so every field is optional with fallback chains and
//! blank fields are omitted. Rendering never fails; bad input degrades to a
//! placeholder string in the message body.

use chrono::{DateTime, Local, NaiveDate};
use serde::Deserialize;

/// Event payload as supplied by callers. Aliases cover the field-name
/// spellings seen from upstream systems.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    #[serde(default, alias = "event_id", alias = "_id")]
    pub id: Option<String>,
    /// Role the staff member is assigned for this event. Falls back to the
    /// staff record's own role, then "STAFF".
    #[serde(default, alias = "assigned_role", alias = "assignedRole")]
    pub role: Option<String>,
    #[serde(default, alias = "event_title", alias = "name")]
    pub title: Option<String>,
    #[serde(default, alias = "event_type", alias = "type")]
    pub event_type: Option<String>,
    #[serde(default, alias = "event_date", alias = "date")]
    pub event_date: Option<String>,
    #[serde(default, alias = "location")]
    pub venue: Option<String>,
    #[serde(default, alias = "client_name", alias = "client")]
    pub client_name: Option<String>,
    #[serde(default, alias = "duration_in_days", alias = "duration")]
    pub duration_days: Option<i64>,
    #[serde(default, alias = "notes")]
    pub description: Option<String>,
}

/// Task payload as supplied by callers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    #[serde(default, alias = "task_id", alias = "_id")]
    pub id: Option<String>,
    #[serde(default, alias = "task_title", alias = "name")]
    pub title: Option<String>,
    #[serde(default, alias = "task_type", alias = "type")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, alias = "due_date", alias = "deadline")]
    pub due_date: Option<String>,
    /// Title of the event this task belongs to, when any.
    #[serde(default, alias = "event_title", alias = "eventName")]
    pub event_title: Option<String>,
    #[serde(default, alias = "payment")]
    pub amount: Option<f64>,
    #[serde(default, alias = "notes")]
    pub description: Option<String>,
}

/// Staff member receiving a notification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    #[serde(default, alias = "full_name", alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "phone_number", alias = "number", alias = "mobile")]
    pub phone: Option<String>,
}

/// Trimmed, non-empty view of an optional field.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// First trimmed, non-empty candidate.
fn first_non_empty<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates.iter().find_map(|c| non_empty(*c))
}

/// Render a date value for a notification body.
///
/// Empty, missing, or the placeholder strings "undefined"/"null" render as
/// "Date not specified". A bare `YYYY-MM-DD` string is formatted as that
/// calendar day (local midnight, never re-read as UTC). Full RFC 3339
/// timestamps are shown in local time. Anything unparseable renders as
/// "Invalid date".
pub fn format_notification_date(raw: Option<&str>) -> String {
    let Some(raw) = non_empty(raw) else {
        return "Date not specified".to_string();
    };
    if raw == "undefined" || raw == "null" {
        return "Date not specified".to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.format("%A, %B %-d, %Y").to_string();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt
            .with_timezone(&Local)
            .format("%A, %B %-d, %Y")
            .to_string();
    }
    "Invalid date".to_string()
}

/// Format a monetary amount with grouped digits (e.g. 15000 → "15,000").
/// Fractional amounts keep two decimals.
fn format_amount(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if frac > 0 {
        out.push_str(&format!(".{:02}", frac));
    }
    out
}

/// Render the event-assignment notification for one staff member.
pub fn render_event(event: &EventInfo, staff: &StaffMember) -> String {
    let name = non_empty(staff.full_name.as_deref()).unwrap_or("there");
    let role = first_non_empty(&[event.role.as_deref(), staff.role.as_deref()])
        .unwrap_or("STAFF")
        .to_uppercase();
    let title = non_empty(event.title.as_deref()).unwrap_or("Untitled Event");
    let event_type = non_empty(event.event_type.as_deref()).unwrap_or("Event");
    let date = format_notification_date(event.event_date.as_deref());

    let mut out = String::new();
    out.push_str("🎉 *EVENT ASSIGNMENT* 🎉\n\n");
    out.push_str(&format!("Hello {}!\n\n", name));
    out.push_str("You have been assigned to a new event:\n\n");
    out.push_str(&format!("📋 *Event:* {}\n", title));
    out.push_str(&format!("🎭 *Type:* {}\n", event_type));
    out.push_str(&format!("👤 *Your Role:* {}\n", role));
    out.push_str(&format!("📅 *Date:* {}\n", date));
    if let Some(venue) = non_empty(event.venue.as_deref()) {
        out.push_str(&format!("📍 *Venue:* {}\n", venue));
    }
    if let Some(client) = non_empty(event.client_name.as_deref()) {
        out.push_str(&format!("🤝 *Client:* {}\n", client));
    }
    if let Some(days) = event.duration_days.filter(|d| *d > 1) {
        out.push_str(&format!("⏳ *Duration:* {} days\n", days));
    }
    if let Some(desc) = non_empty(event.description.as_deref()) {
        out.push_str(&format!("\n📝 *Details:* \"{}\"\n", desc));
    }
    out.push_str("\nPlease be prepared and on time. Reply here if anything is unclear.\nThank you!");
    out
}

/// Render the task-assignment notification for one staff member.
pub fn render_task(task: &TaskInfo, staff: &StaffMember) -> String {
    let name = non_empty(staff.full_name.as_deref()).unwrap_or("there");
    let title = non_empty(task.title.as_deref()).unwrap_or("Untitled Task");
    let task_type = non_empty(task.task_type.as_deref()).unwrap_or("General");
    let priority = non_empty(task.priority.as_deref()).unwrap_or("Medium");

    let mut out = String::new();
    out.push_str("📌 *TASK ASSIGNMENT* 📌\n\n");
    out.push_str(&format!("Hello {}!\n\n", name));
    out.push_str("A new task has been assigned to you:\n\n");
    out.push_str(&format!("📋 *Task:* {}\n", title));
    out.push_str(&format!("🗂 *Type:* {}\n", task_type));
    out.push_str(&format!("⚡ *Priority:* {}\n", priority));
    if non_empty(task.due_date.as_deref()).is_some() {
        out.push_str(&format!(
            "📅 *Due:* {}\n",
            format_notification_date(task.due_date.as_deref())
        ));
    }
    if let Some(event_title) = non_empty(task.event_title.as_deref()) {
        out.push_str(&format!("🎪 *Event:* {}\n", event_title));
    }
    if let Some(amount) = task.amount.filter(|a| *a > 0.0) {
        out.push_str(&format!("💰 *Amount:* ₹{}\n", format_amount(amount)));
    }
    if let Some(desc) = non_empty(task.description.as_deref()) {
        out.push_str(&format!("\n📝 *Details:* \"{}\"\n", desc));
    }
    out.push_str("\nPlease complete it on time.\nThank you!");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_render_includes_assignment_fields() {
        let event = EventInfo {
            title: Some("Gala".to_string()),
            event_date: Some("2024-03-05".to_string()),
            ..Default::default()
        };
        let staff = StaffMember {
            full_name: Some("Asha".to_string()),
            role: Some("usher".to_string()),
            ..Default::default()
        };
        let body = render_event(&event, &staff);
        assert!(body.contains("EVENT ASSIGNMENT"));
        assert!(body.contains("Asha"));
        assert!(body.contains("USHER"));
        assert!(body.contains("Gala"));
        assert!(body.contains("Tuesday, March 5, 2024"));
    }

    #[test]
    fn event_role_falls_back_through_chain() {
        let event = EventInfo {
            role: Some("coordinator".to_string()),
            ..Default::default()
        };
        let staff = StaffMember {
            role: Some("usher".to_string()),
            ..Default::default()
        };
        assert!(render_event(&event, &staff).contains("COORDINATOR"));

        let event = EventInfo::default();
        assert!(render_event(&event, &staff).contains("USHER"));

        let staff = StaffMember::default();
        assert!(render_event(&event, &staff).contains("STAFF"));
    }

    #[test]
    fn unparseable_date_renders_as_invalid() {
        let event = EventInfo {
            event_date: Some("not-a-date".to_string()),
            ..Default::default()
        };
        let body = render_event(&event, &StaffMember::default());
        assert!(body.contains("Invalid date"));
    }

    #[test]
    fn missing_and_placeholder_dates_are_unspecified() {
        assert_eq!(format_notification_date(None), "Date not specified");
        assert_eq!(format_notification_date(Some("")), "Date not specified");
        assert_eq!(format_notification_date(Some("  ")), "Date not specified");
        assert_eq!(
            format_notification_date(Some("undefined")),
            "Date not specified"
        );
        assert_eq!(format_notification_date(Some("null")), "Date not specified");
    }

    #[test]
    fn bare_calendar_date_is_not_day_shifted() {
        // Must stay March 5 in every timezone.
        assert_eq!(
            format_notification_date(Some("2024-03-05")),
            "Tuesday, March 5, 2024"
        );
    }

    #[test]
    fn optional_event_fields_are_omitted_when_blank() {
        let event = EventInfo {
            venue: Some("  ".to_string()),
            duration_days: Some(1),
            ..Default::default()
        };
        let body = render_event(&event, &StaffMember::default());
        assert!(!body.contains("Venue"));
        assert!(!body.contains("Client"));
        assert!(!body.contains("Duration"));
        assert!(!body.contains("Details"));
    }

    #[test]
    fn multi_day_event_shows_duration() {
        let event = EventInfo {
            duration_days: Some(3),
            ..Default::default()
        };
        let body = render_event(&event, &StaffMember::default());
        assert!(body.contains("3 days"));
    }

    #[test]
    fn task_render_applies_defaults() {
        let task = TaskInfo {
            title: Some("Pack equipment".to_string()),
            ..Default::default()
        };
        let body = render_task(&task, &StaffMember::default());
        assert!(body.contains("TASK ASSIGNMENT"));
        assert!(body.contains("Pack equipment"));
        assert!(body.contains("General"));
        assert!(body.contains("Medium"));
        assert!(!body.contains("Due"));
        assert!(!body.contains("Amount"));
    }

    #[test]
    fn task_amount_is_grouped_and_gated_on_positive() {
        let task = TaskInfo {
            amount: Some(15000.0),
            ..Default::default()
        };
        assert!(render_task(&task, &StaffMember::default()).contains("₹15,000"));

        let task = TaskInfo {
            amount: Some(0.0),
            ..Default::default()
        };
        assert!(!render_task(&task, &StaffMember::default()).contains("Amount"));
    }

    #[test]
    fn amount_grouping() {
        assert_eq!(format_amount(999.0), "999");
        assert_eq!(format_amount(15000.0), "15,000");
        assert_eq!(format_amount(1234567.5), "1,234,567.50");
    }

    #[test]
    fn payloads_accept_alternate_field_spellings() {
        let event: EventInfo =
            serde_json::from_str(r#"{"event_title":"Expo","event_date":"2024-03-05"}"#).unwrap();
        assert_eq!(event.title.as_deref(), Some("Expo"));
        assert_eq!(event.event_date.as_deref(), Some("2024-03-05"));

        let staff: StaffMember = serde_json::from_str(r#"{"name":"Ravi","number":"98765"}"#).unwrap();
        assert_eq!(staff.full_name.as_deref(), Some("Ravi"));
        assert_eq!(staff.phone.as_deref(), Some("98765"));
    }
}
