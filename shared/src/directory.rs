use chrono::{NaiveDate, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::attendance::admission::{RejectedAttendee, RequestedAttendee};
use crate::attendance::cancellation;
use crate::attendance::{AttendanceContext, AttendanceError, Result};
use crate::error::StoreError;
use crate::models::minors::{age_on, ADULT_AGE};
use crate::models::{merge_generations, now_str, AttendeeRef, AttendeeType, Minor};

#[derive(Deserialize, Debug, Clone, Default)]
pub struct MinorInput {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct MinorPatch {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    /// An empty string clears the email
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MinorDeletion {
    pub minor_id: String,
    pub cancelled_rsvps: u32,
}

/// Requested attendees split by ownership.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub owned: Vec<AttendeeRef>,
    pub rejected: Vec<RejectedAttendee>,
}

/// Guardians and the minors registered under them.
pub struct Directory<'a> {
    ctx: &'a AttendanceContext,
}

impl<'a> Directory<'a> {
    pub fn new(ctx: &'a AttendanceContext) -> Self {
        Self { ctx }
    }

    pub async fn list_minors(&self, guardian_email: &str) -> Result<Vec<Minor>> {
        let mut minors = self.ctx.minors.list_minors(guardian_email).await?;
        minors.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(minors)
    }

    pub async fn add_minor(&self, guardian_email: &str, input: MinorInput) -> Result<Minor> {
        let first_name = required("first_name", &input.first_name)?;
        let last_name = required("last_name", &input.last_name)?;
        let date_of_birth = parse_minor_dob(&input.date_of_birth)?;
        let email = normalize_email(input.email.as_deref())?;

        let now = now_str();
        let minor = Minor {
            guardian_email: guardian_email.to_string(),
            minor_id: Uuid::new_v4().to_string(),
            first_name,
            last_name,
            date_of_birth,
            email,
            created_at: now.clone(),
            updated_at: now,
        };

        let minor = self.ctx.minors.put_minor(minor).await?;
        info!("Added minor {} for {}", minor.minor_id, guardian_email);
        Ok(minor)
    }

    pub async fn update_minor(
        &self,
        guardian_email: &str,
        minor_id: &str,
        patch: MinorPatch,
    ) -> Result<Minor> {
        let mut minor = self.owned_minor(guardian_email, minor_id).await?;

        if let Some(first_name) = patch.first_name {
            minor.first_name = required("first_name", &first_name)?;
        }
        if let Some(last_name) = patch.last_name {
            minor.last_name = required("last_name", &last_name)?;
        }
        if let Some(dob) = patch.date_of_birth {
            minor.date_of_birth = parse_date(&dob)?;
        }
        if let Some(email) = patch.email {
            minor.email = normalize_email(Some(&email))?;
        }
        check_minor_age(minor.date_of_birth)?;
        minor.updated_at = now_str();

        Ok(self.ctx.minors.put_minor(minor).await?)
    }

    /// Removes the minor, then cancels their active RSVPs for events that
    /// have not started yet. Cascade failures are logged and skipped.
    pub async fn delete_minor(&self, guardian_email: &str, minor_id: &str) -> Result<MinorDeletion> {
        self.owned_minor(guardian_email, minor_id).await?;
        self.ctx
            .minors
            .delete_minor(guardian_email, minor_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => AttendanceError::MinorNotFound(minor_id.to_string()),
                other => other.into(),
            })?;

        let rows = self.ctx.attendees.list_guardian_attendees(guardian_email).await?;
        let active: Vec<_> = merge_generations(rows)
            .into_iter()
            .filter(|r| r.attendee_type == AttendeeType::Minor)
            .filter(|r| r.attendee_id == minor_id && r.is_active())
            .collect();

        let event_ids: Vec<String> = active.iter().map(|r| r.event_id.clone()).collect();
        let now = Utc::now();
        let upcoming: HashSet<String> = self
            .ctx
            .events
            .get_events(&event_ids)
            .await?
            .into_iter()
            .filter(|event| !event.has_started(now))
            .map(|event| event.event_id)
            .collect();

        let mut cancelled_rsvps = 0;
        for record in active.iter().filter(|r| upcoming.contains(&r.event_id)) {
            match cancellation::cancel(
                self.ctx,
                &record.event_id,
                minor_id,
                guardian_email,
                Some("Minor removed by guardian".to_string()),
            )
            .await
            {
                Ok(outcome) if !outcome.already_cancelled => cancelled_rsvps += 1,
                Ok(_) => {}
                Err(e) => warn!(
                    "Failed to cancel RSVP for removed minor {} on {}: {}",
                    minor_id, record.event_id, e
                ),
            }
        }

        info!(
            "Deleted minor {} for {}, cancelled {} upcoming RSVPs",
            minor_id, guardian_email, cancelled_rsvps
        );
        Ok(MinorDeletion {
            minor_id: minor_id.to_string(),
            cancelled_rsvps,
        })
    }

    /// Splits `requested` into attendees owned by the guardian and rejections,
    /// dropping repeated entries.
    pub async fn resolve_attendees(
        &self,
        guardian_email: &str,
        requested: &[RequestedAttendee],
    ) -> Result<Resolution> {
        let wants_minors = requested
            .iter()
            .any(|r| r.attendee_type == AttendeeType::Minor);
        let minors: HashMap<String, Minor> = if wants_minors {
            self.ctx
                .minors
                .list_minors(guardian_email)
                .await?
                .into_iter()
                .map(|m| (m.minor_id.clone(), m))
                .collect()
        } else {
            HashMap::new()
        };

        let mut seen = HashSet::new();
        let mut resolution = Resolution::default();
        for entry in requested {
            let id = entry.id.trim();
            if !seen.insert((entry.attendee_type, id.to_string())) {
                continue;
            }
            match entry.attendee_type {
                AttendeeType::Guardian if id == guardian_email => {
                    resolution.owned.push(AttendeeRef {
                        attendee_id: guardian_email.to_string(),
                        attendee_type: AttendeeType::Guardian,
                        display_name: self.guardian_display_name(guardian_email).await,
                    });
                }
                AttendeeType::Minor if minors.contains_key(id) => {
                    let minor = &minors[id];
                    resolution.owned.push(AttendeeRef {
                        attendee_id: minor.minor_id.clone(),
                        attendee_type: AttendeeType::Minor,
                        display_name: minor.display_name(),
                    });
                }
                attendee_type => {
                    let err = AttendanceError::UnauthorizedAttendee(id.to_string());
                    resolution.rejected.push(RejectedAttendee {
                        attendee_id: id.to_string(),
                        attendee_type,
                        code: err.code().to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(resolution)
    }

    async fn guardian_display_name(&self, email: &str) -> String {
        match self.ctx.volunteers.get_volunteer(email).await {
            Ok(Some(volunteer)) => volunteer.display_name(),
            Ok(None) => email.to_string(),
            Err(e) => {
                warn!("Failed to load volunteer profile for {}: {}", email, e);
                email.to_string()
            }
        }
    }

    async fn owned_minor(&self, guardian_email: &str, minor_id: &str) -> Result<Minor> {
        self.ctx
            .minors
            .get_minor(guardian_email, minor_id)
            .await?
            .ok_or_else(|| AttendanceError::MinorNotFound(minor_id.to_string()))
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AttendanceError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let dob = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AttendanceError::Validation("date_of_birth must be in YYYY-MM-DD format".to_string())
    })?;
    if dob > Utc::now().date_naive() {
        return Err(AttendanceError::Validation(
            "date_of_birth cannot be in the future".to_string(),
        ));
    }
    Ok(dob)
}

fn check_minor_age(dob: NaiveDate) -> Result<()> {
    if age_on(dob, Utc::now().date_naive()) >= ADULT_AGE {
        return Err(AttendanceError::Validation(format!(
            "Minor must be under {} years old",
            ADULT_AGE
        )));
    }
    Ok(())
}

fn parse_minor_dob(raw: &str) -> Result<NaiveDate> {
    let dob = parse_date(raw)?;
    check_minor_age(dob)?;
    Ok(dob)
}

/// Lower-cases and sanity-checks an optional email. Blank means none.
pub fn normalize_email(raw: Option<&str>) -> Result<Option<String>> {
    let email = match raw.map(str::trim).filter(|e| !e.is_empty()) {
        Some(email) => email.to_lowercase(),
        None => return Ok(None),
    };
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(AttendanceError::Validation("Invalid email format".to_string()));
    }
    Ok(Some(email))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendeeStatus;
    use crate::test_utils::fixtures::{active_event, minor, minor_record, TestContext};
    use chrono::{Datelike, Duration};

    const GUARDIAN: &str = "g@x.com";

    fn input(dob: &str) -> MinorInput {
        MinorInput {
            first_name: " Sam ".into(),
            last_name: "Lee".into(),
            date_of_birth: dob.into(),
            email: Some("Sam@Example.COM".into()),
        }
    }

    fn years_ago(years: i32) -> String {
        let today = Utc::now().date_naive();
        format!("{}-01-01", today.year() - years)
    }

    #[tokio::test]
    async fn add_minor_validates_and_normalizes() {
        let t = TestContext::new();
        let directory = Directory::new(&t.ctx);

        let minor = directory
            .add_minor(GUARDIAN, input(&years_ago(10)))
            .await
            .unwrap();
        assert_eq!(minor.first_name, "Sam");
        assert_eq!(minor.email.as_deref(), Some("sam@example.com"));
        assert!(Uuid::parse_str(&minor.minor_id).is_ok());
        assert_eq!(directory.list_minors(GUARDIAN).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn adults_and_bad_dates_are_rejected() {
        let t = TestContext::new();
        let directory = Directory::new(&t.ctx);

        for dob in [years_ago(19), "2015/01/01".to_string()] {
            let err = directory.add_minor(GUARDIAN, input(&dob)).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "dob {}", dob);
        }

        let tomorrow = (Utc::now() + Duration::days(2)).date_naive().to_string();
        let err = directory.add_minor(GUARDIAN, input(&tomorrow)).await.unwrap_err();
        assert!(err.to_string().contains("future"));

        let mut bad_email = input(&years_ago(10));
        bad_email.email = Some("sam@localhost".into());
        assert!(directory.add_minor(GUARDIAN, bad_email).await.is_err());
    }

    #[tokio::test]
    async fn update_revalidates_age_on_merged_record() {
        let t = TestContext::new();
        t.minors.insert(minor(GUARDIAN, "m1", 2015));
        let directory = Directory::new(&t.ctx);

        let patch = MinorPatch {
            date_of_birth: Some(years_ago(25)),
            ..Default::default()
        };
        let err = directory.update_minor(GUARDIAN, "m1", patch).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let patch = MinorPatch {
            first_name: Some("Alex".into()),
            email: Some(String::new()),
            ..Default::default()
        };
        let updated = directory.update_minor(GUARDIAN, "m1", patch).await.unwrap();
        assert_eq!(updated.first_name, "Alex");
        assert!(updated.email.is_none());

        let err = directory
            .update_minor("other@x.com", "m1", MinorPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MINOR_NOT_FOUND");
    }

    #[tokio::test]
    async fn delete_cascades_to_upcoming_rsvps_only() {
        let t = TestContext::new();
        t.minors.insert(minor(GUARDIAN, "m1", 2015));

        let mut upcoming = active_event("upcoming", 5);
        upcoming.active_count = Some(1);
        t.events.insert(upcoming);

        let mut started = active_event("started", 5);
        started.start_time = Utc::now() - Duration::hours(1);
        started.active_count = Some(1);
        t.events.insert(started);

        t.attendees
            .insert(minor_record("upcoming", GUARDIAN, "m1", AttendeeStatus::Active));
        t.attendees
            .insert(minor_record("started", GUARDIAN, "m1", AttendeeStatus::Active));

        let deletion = Directory::new(&t.ctx)
            .delete_minor(GUARDIAN, "m1")
            .await
            .unwrap();
        assert_eq!(deletion.cancelled_rsvps, 1);
        assert_eq!(
            t.attendees.get("upcoming", "m1").unwrap().status,
            AttendeeStatus::Cancelled
        );
        assert!(t.attendees.get("started", "m1").unwrap().is_active());
        assert_eq!(t.events.active_count("upcoming"), Some(0));
        assert!(t.minors.get_sync(GUARDIAN, "m1").is_none());
    }

    #[tokio::test]
    async fn delete_of_foreign_minor_is_not_found() {
        let t = TestContext::new();
        t.minors.insert(minor(GUARDIAN, "m1", 2015));
        let err = Directory::new(&t.ctx)
            .delete_minor("other@x.com", "m1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MINOR_NOT_FOUND");
    }

    #[test]
    fn email_rules() {
        assert_eq!(
            normalize_email(Some(" A@B.org ")).unwrap().as_deref(),
            Some("a@b.org")
        );
        assert_eq!(normalize_email(Some("  ")).unwrap(), None);
        assert!(normalize_email(Some("a@b")).is_err());
        assert!(normalize_email(Some("@b.org")).is_err());
        assert!(normalize_email(Some("a@b@c.org")).is_err());
    }
}
