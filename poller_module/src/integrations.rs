//! Integration catalog shown on the dashboard.
//!
//! A fixed set of message sources with a toggleable enabled flag. The
//! catalog is in-memory only; toggling does not start or stop any
//! ingestion, it drives what the frontend offers.

use std::sync::Mutex;

use serde::Serialize;

const STATUS_CONNECTED: &str = "connected";
const STATUS_DISCONNECTED: &str = "disconnected";

#[derive(Debug, Clone, Serialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub logo: String,
    pub enabled: bool,
    pub status: String,
    pub category: String,
}

fn entry(name: &str, display_name: &str, description: &str, category: &str, enabled: bool) -> Integration {
    Integration {
        id: name.to_string(),
        name: name.to_string(),
        display_name: display_name.to_string(),
        description: description.to_string(),
        logo: format!("/logos/{name}.svg"),
        enabled,
        status: if enabled {
            STATUS_CONNECTED
        } else {
            STATUS_DISCONNECTED
        }
        .to_string(),
        category: category.to_string(),
    }
}

pub struct IntegrationRegistry {
    // Display order matters to the frontend, so a Vec instead of a map.
    entries: Mutex<Vec<Integration>>,
}

impl IntegrationRegistry {
    pub fn with_defaults() -> Self {
        let entries = vec![
            entry(
                "gmail",
                "Gmail",
                "Connect your Gmail account to automatically extract action items from emails",
                "Email",
                true,
            ),
            entry(
                "slack",
                "Slack",
                "Integrate with Slack to turn team messages into actionable tasks",
                "Team Chat",
                false,
            ),
            entry(
                "whatsapp",
                "WhatsApp",
                "Connect WhatsApp to create todos from important messages",
                "Messaging",
                false,
            ),
            entry(
                "outlook",
                "Outlook",
                "Sync your Outlook emails and automatically create action items",
                "Email",
                false,
            ),
            entry(
                "telegram",
                "Telegram",
                "Monitor Telegram messages and convert them into todos",
                "Messaging",
                false,
            ),
            entry(
                "discord",
                "Discord",
                "Connect Discord servers to track community tasks and discussions",
                "Community",
                false,
            ),
            entry(
                "teams",
                "Microsoft Teams",
                "Integrate Microsoft Teams for seamless collaboration and task management",
                "Collaboration",
                false,
            ),
            entry(
                "linkedin",
                "LinkedIn",
                "Track professional messages and networking opportunities",
                "Professional",
                false,
            ),
        ];
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// All integrations in display order.
    pub fn list(&self) -> Vec<Integration> {
        self.lock().clone()
    }

    pub fn get(&self, name: &str) -> Option<Integration> {
        self.lock().iter().find(|entry| entry.name == name).cloned()
    }

    /// Flip the enabled flag; `status` follows it. `None` for an unknown
    /// name.
    pub fn toggle(&self, name: &str) -> Option<Integration> {
        let mut entries = self.lock();
        let entry = entries.iter_mut().find(|entry| entry.name == name)?;
        entry.enabled = !entry.enabled;
        entry.status = if entry.enabled {
            STATUS_CONNECTED
        } else {
            STATUS_DISCONNECTED
        }
        .to_string();
        Some(entry.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Integration>> {
        self.entries.lock().expect("integration registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_list_gmail_first_and_connected() {
        let registry = IntegrationRegistry::with_defaults();
        let all = registry.list();
        assert_eq!(all.len(), 8);
        assert_eq!(all[0].name, "gmail");
        assert!(all[0].enabled);
        assert_eq!(all[0].status, "connected");
        assert!(all[1..].iter().all(|entry| !entry.enabled));
    }

    #[test]
    fn toggle_flips_enabled_and_status_together() {
        let registry = IntegrationRegistry::with_defaults();

        let slack = registry.toggle("slack").expect("toggle");
        assert!(slack.enabled);
        assert_eq!(slack.status, "connected");

        let slack = registry.toggle("slack").expect("toggle");
        assert!(!slack.enabled);
        assert_eq!(slack.status, "disconnected");

        // The registry itself reflects the change, not just the returned copy.
        assert!(!registry.get("slack").expect("get").enabled);
    }

    #[test]
    fn unknown_integration_is_none() {
        let registry = IntegrationRegistry::with_defaults();
        assert!(registry.get("carrier-pigeon").is_none());
        assert!(registry.toggle("carrier-pigeon").is_none());
    }
}
