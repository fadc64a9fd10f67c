use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub const ADULT_AGE: u32 = 18;

/// A dependent registered under a guardian, keyed by `(guardian_email, minor_id)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Minor {
    pub guardian_email: String,
    pub minor_id: String,
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Minor {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn age_on(&self, today: NaiveDate) -> u32 {
        age_on(self.date_of_birth, today)
    }
}

/// Whole years between `date_of_birth` and `today`.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_counts_birthdays() {
        let dob = date(2008, 6, 15);
        assert_eq!(age_on(dob, date(2026, 6, 14)), 17);
        assert_eq!(age_on(dob, date(2026, 6, 15)), 18);
        assert_eq!(age_on(dob, date(2008, 6, 15)), 0);
    }

    #[test]
    fn date_of_birth_round_trips_as_plain_date() {
        let minor = Minor {
            guardian_email: "g@x.com".into(),
            minor_id: "m1".into(),
            first_name: "Sam".into(),
            last_name: "Lee ".into(),
            date_of_birth: date(2015, 1, 2),
            email: None,
            created_at: "t0".into(),
            updated_at: "t0".into(),
        };
        let value = serde_json::to_value(&minor).unwrap();
        assert_eq!(value["date_of_birth"], "2015-01-02");
        assert!(value.get("email").is_none());
        assert_eq!(minor.display_name(), "Sam Lee");
    }
}
