use log::warn;
use once_cell::sync::OnceCell;
use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Runtime configuration read from the Lambda environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub events_table: String,
    pub rsvps_table: String,
    pub legacy_rsvps_table: String,
    pub minors_table: String,
    pub volunteers_table: String,
    pub sessions_table: String,
    pub sns_topic_arn: Option<String>,
    pub admin_emails: Vec<String>,
    pub admission_max_attempts: u32,
    pub retry_initial_delay: Duration,
    pub retry_max_delay: Duration,
    pub remove_base_path: bool,
    pub skip_sns: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            events_table: "events".to_string(),
            rsvps_table: "event_rsvps".to_string(),
            legacy_rsvps_table: "rsvps".to_string(),
            minors_table: "minors".to_string(),
            volunteers_table: "volunteers".to_string(),
            sessions_table: "sessions".to_string(),
            sns_topic_arn: None,
            admin_emails: Vec::new(),
            admission_max_attempts: 5,
            retry_initial_delay: Duration::from_millis(25),
            retry_max_delay: Duration::from_millis(400),
            remove_base_path: false,
            skip_sns: false,
        }
    }
}

impl Config {
    /// Process-wide configuration, loaded on first use.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup so tests don't have to
    /// touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let string_or = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };
        let number_or = |key: &str, default: u64| match lookup(key) {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                warn!("Invalid value '{}' for {}, using default {}", raw, key, default);
                default
            }),
            None => default,
        };
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false)
        };

        let admin_emails = lookup("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let admission_max_attempts =
            number_or("ADMISSION_MAX_ATTEMPTS", defaults.admission_max_attempts as u64).max(1)
                as u32;

        Self {
            events_table: string_or("EVENTS_TABLE_NAME", defaults.events_table),
            rsvps_table: string_or("EVENT_RSVPS_TABLE_NAME", defaults.rsvps_table),
            legacy_rsvps_table: string_or("LEGACY_RSVPS_TABLE_NAME", defaults.legacy_rsvps_table),
            minors_table: string_or("MINORS_TABLE_NAME", defaults.minors_table),
            volunteers_table: string_or("VOLUNTEERS_TABLE_NAME", defaults.volunteers_table),
            sessions_table: string_or("SESSIONS_TABLE_NAME", defaults.sessions_table),
            sns_topic_arn: lookup("SNS_TOPIC_ARN").filter(|v| !v.trim().is_empty()),
            admin_emails,
            admission_max_attempts,
            retry_initial_delay: Duration::from_millis(number_or(
                "RETRY_INITIAL_DELAY_MS",
                defaults.retry_initial_delay.as_millis() as u64,
            )),
            retry_max_delay: Duration::from_millis(number_or(
                "RETRY_MAX_DELAY_MS",
                defaults.retry_max_delay.as_millis() as u64,
            )),
            remove_base_path: flag("REMOVE_BASE_PATH"),
            skip_sns: flag("TEST_SNS"),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.admission_max_attempts)
            .with_initial_delay(self.retry_initial_delay)
            .with_max_delay(self.retry_max_delay)
    }
}
