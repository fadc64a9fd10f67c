use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct VolunteerMetrics {
    #[serde(default)]
    pub total_rsvps: i64,
    #[serde(default)]
    pub total_cancellations: i64,
    #[serde(default)]
    pub total_no_shows: i64,
    #[serde(default)]
    pub total_attended: i64,
}

/// Guardian profile, keyed by `email`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Volunteer {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub volunteer_metrics: VolunteerMetrics,
}

impl Volunteer {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }
}

/// One counter bump under `volunteer_metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDelta {
    Rsvp,
    Cancellation,
    NoShow,
    Attended,
}

impl MetricDelta {
    pub fn attribute(&self) -> &'static str {
        match self {
            MetricDelta::Rsvp => "total_rsvps",
            MetricDelta::Cancellation => "total_cancellations",
            MetricDelta::NoShow => "total_no_shows",
            MetricDelta::Attended => "total_attended",
        }
    }

    pub fn apply(&self, metrics: &mut VolunteerMetrics, by: i64) {
        match self {
            MetricDelta::Rsvp => metrics.total_rsvps += by,
            MetricDelta::Cancellation => metrics.total_cancellations += by,
            MetricDelta::NoShow => metrics.total_no_shows += by,
            MetricDelta::Attended => metrics.total_attended += by,
        }
    }
}
