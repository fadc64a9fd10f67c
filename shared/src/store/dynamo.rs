use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, KeysAndAttributes, ReturnValue};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use std::collections::HashMap;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::models::{
    AttendeeRecord, AttendeeStatus, Event, EventStatus, LegacyRsvpRecord, MetricDelta, Minor,
    Session, StoredAttendee, Volunteer, VolunteerMetrics,
};
use crate::retry::RetryPolicy;
use crate::store::{
    AttendeeStore, AttendeeTransition, EventStore, MinorStore, SessionStore, VolunteerStore,
};

type Item = HashMap<String, AttributeValue>;

pub const EVENT_STATUS_INDEX: &str = "status-start_time-index";
pub const GUARDIAN_EMAIL_INDEX: &str = "guardian_email-index";
pub const LEGACY_EMAIL_INDEX: &str = "email-index";

/// DynamoDB caps BatchGetItem at 100 keys per request.
const BATCH_GET_LIMIT: usize = 100;

pub async fn create_client() -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    Client::new(&config)
}

fn s(value: impl Into<String>) -> AttributeValue {
    AttributeValue::S(value.into())
}

fn n(value: impl ToString) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub struct DynamoEventStore {
    client: Client,
    table_name: String,
    retry: RetryPolicy,
}

impl DynamoEventStore {
    pub async fn new() -> Self {
        let config = Config::get();
        Self::with_client_and_table(create_client().await, config.events_table.clone())
            .with_retry(config.retry_policy())
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self {
            client,
            table_name,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn batch_get_chunk(&self, keys: Vec<Item>) -> Result<Vec<Item>> {
        let mut pending = keys;
        let mut found = Vec::new();
        let mut attempt = 0;

        while !pending.is_empty() {
            let request = KeysAndAttributes::builder()
                .set_keys(Some(pending))
                .build()
                .map_err(|e| StoreError::Dynamo(format!("batch get request: {}", e)))?;

            let output = self
                .client
                .batch_get_item()
                .request_items(&self.table_name, request)
                .send()
                .await
                .map_err(|e| StoreError::from_sdk("batch get events", e))?;

            if let Some(mut responses) = output.responses {
                found.extend(responses.remove(&self.table_name).unwrap_or_default());
            }

            pending = output
                .unprocessed_keys
                .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
                .map(|kaa| kaa.keys)
                .unwrap_or_default();

            if !pending.is_empty() {
                attempt += 1;
                if !self.retry.should_retry(attempt) {
                    return Err(StoreError::Throttled(format!(
                        "{} event keys left unprocessed",
                        pending.len()
                    )));
                }
                let delay = self.retry.delay_for_attempt(attempt - 1);
                debug!(
                    "Retrying {} unprocessed event keys in {:?}",
                    pending.len(),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl EventStore for DynamoEventStore {
    async fn get_event(&self, event_id: &str) -> Result<Event> {
        debug!("Fetching event {} from {}", event_id, self.table_name);
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("event_id", s(event_id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("get event", e))?;

        match output.item {
            Some(item) => Ok(serde_dynamo::from_item(item)?),
            None => Err(StoreError::NotFound(format!("event {}", event_id))),
        }
    }

    async fn get_events(&self, event_ids: &[String]) -> Result<Vec<Event>> {
        let mut unique: Vec<&String> = event_ids.iter().collect();
        unique.sort();
        unique.dedup();

        let mut events = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(BATCH_GET_LIMIT) {
            let keys = chunk
                .iter()
                .map(|id| HashMap::from([("event_id".to_string(), s(id.as_str()))]))
                .collect();
            for item in self.batch_get_chunk(keys).await? {
                events.push(serde_dynamo::from_item(item)?);
            }
        }
        Ok(events)
    }

    async fn list_events_by_status(
        &self,
        status: EventStatus,
        started_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>> {
        let mut query = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(EVENT_STATUS_INDEX)
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":status", s(status.as_str()));

        query = match started_before {
            Some(before) => query
                .key_condition_expression("#status = :status AND start_time < :before")
                .expression_attribute_values(
                    ":before",
                    s(before.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ),
            None => query.key_condition_expression("#status = :status"),
        };

        let items: Vec<Item> = query
            .into_paginator()
            .items()
            .send()
            .collect::<std::result::Result<Vec<_>, _>>()
            .await
            .map_err(|e| StoreError::from_sdk("query events by status", e))?;

        Ok(serde_dynamo::from_items(items)?)
    }

    async fn create_event(&self, event: Event) -> Result<Event> {
        let item: Item = serde_dynamo::to_item(&event)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(event_id)")
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("create event", e))?;
        Ok(event)
    }

    async fn transition_status(
        &self,
        event_id: &str,
        from: EventStatus,
        to: EventStatus,
        reason: Option<&str>,
        now: &str,
    ) -> Result<Event> {
        let mut update = "SET #status = :to, updated_at = :now".to_string();
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("event_id", s(event_id))
            .condition_expression("#status = :from")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":from", s(from.as_str()))
            .expression_attribute_values(":to", s(to.as_str()))
            .expression_attribute_values(":now", s(now))
            .return_values(ReturnValue::AllNew);

        if let Some(reason) = reason {
            update.push_str(", cancellation_reason = :reason");
            request = request.expression_attribute_values(":reason", s(reason));
        }

        let output = request
            .update_expression(update)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk(&format!("transition event {}", event_id), e))?;

        let attributes = output
            .attributes
            .ok_or_else(|| StoreError::Dynamo("update returned no attributes".to_string()))?;
        Ok(serde_dynamo::from_item(attributes)?)
    }

    async fn compare_and_set_active_count(
        &self,
        event_id: &str,
        expected: Option<u32>,
        new: u32,
        require_active: bool,
        now: &str,
    ) -> Result<()> {
        let mut condition = match expected {
            Some(_) => "active_count = :expected".to_string(),
            None => "attribute_exists(event_id) AND attribute_not_exists(active_count)".to_string(),
        };

        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("event_id", s(event_id))
            .update_expression("SET active_count = :new, updated_at = :now")
            .expression_attribute_values(":new", n(new))
            .expression_attribute_values(":now", s(now));

        if let Some(expected) = expected {
            request = request.expression_attribute_values(":expected", n(expected));
        }
        if require_active {
            condition.push_str(" AND #status = :active");
            request = request
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":active", s(EventStatus::Active.as_str()));
        }

        request
            .condition_expression(condition)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk(&format!("set active_count on {}", event_id), e))?;
        Ok(())
    }
}

pub struct DynamoAttendeeStore {
    client: Client,
    table_name: String,
    legacy_table_name: String,
}

impl DynamoAttendeeStore {
    pub async fn new() -> Self {
        let config = Config::get();
        Self::with_client_and_tables(
            create_client().await,
            config.rsvps_table.clone(),
            config.legacy_rsvps_table.clone(),
        )
    }

    pub fn with_client_and_tables(
        client: Client,
        table_name: String,
        legacy_table_name: String,
    ) -> Self {
        Self {
            client,
            table_name,
            legacy_table_name,
        }
    }

    async fn query_items(
        &self,
        table: &str,
        index: Option<&str>,
        key_name: &str,
        key_value: &str,
    ) -> Result<Vec<Item>> {
        self.client
            .query()
            .table_name(table)
            .set_index_name(index.map(str::to_string))
            .consistent_read(index.is_none())
            .key_condition_expression("#key = :key")
            .expression_attribute_names("#key", key_name)
            .expression_attribute_values(":key", s(key_value))
            .into_paginator()
            .items()
            .send()
            .collect::<std::result::Result<Vec<_>, _>>()
            .await
            .map_err(|e| StoreError::from_sdk(&format!("query {} by {}", table, key_name), e))
    }

    fn collect_generations(current: Vec<Item>, legacy: Vec<Item>) -> Result<Vec<StoredAttendee>> {
        let mut rows = Vec::with_capacity(current.len() + legacy.len());
        for item in current {
            rows.push(StoredAttendee::Current(serde_dynamo::from_item(item)?));
        }
        for item in legacy {
            let parsed: std::result::Result<LegacyRsvpRecord, _> = serde_dynamo::from_item(item);
            match parsed {
                Ok(row) => rows.push(StoredAttendee::Legacy(row)),
                Err(e) => warn!("Skipping unreadable legacy RSVP row: {}", e),
            }
        }
        Ok(rows)
    }

    async fn conditional_put(
        &self,
        record: AttendeeRecord,
        condition: &str,
        with_status: bool,
    ) -> Result<()> {
        let item: Item = serde_dynamo::to_item(&record)?;
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression(condition);
        if with_status {
            request = request
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":active", s(AttendeeStatus::Active.as_str()));
        }
        request.send().await.map_err(|e| {
            StoreError::from_sdk(
                &format!("put attendee {}/{}", record.event_id, record.attendee_id),
                e,
            )
        })?;
        Ok(())
    }
}

#[async_trait]
impl AttendeeStore for DynamoAttendeeStore {
    async fn get_attendee(
        &self,
        event_id: &str,
        attendee_id: &str,
    ) -> Result<Option<AttendeeRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("event_id", s(event_id))
            .key("attendee_id", s(attendee_id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("get attendee", e))?;

        output
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    async fn get_legacy_rsvp(
        &self,
        event_id: &str,
        email: &str,
    ) -> Result<Option<LegacyRsvpRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.legacy_table_name)
            .key("event_id", s(event_id))
            .key("email", s(email))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("get legacy rsvp", e))?;

        output
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    async fn list_event_attendees(&self, event_id: &str) -> Result<Vec<StoredAttendee>> {
        let current = self
            .query_items(&self.table_name, None, "event_id", event_id)
            .await?;
        let legacy = self
            .query_items(&self.legacy_table_name, None, "event_id", event_id)
            .await?;
        debug!(
            "Event {} has {} current and {} legacy rows",
            event_id,
            current.len(),
            legacy.len()
        );
        Self::collect_generations(current, legacy)
    }

    async fn list_guardian_attendees(&self, guardian_email: &str) -> Result<Vec<StoredAttendee>> {
        let current = self
            .query_items(
                &self.table_name,
                Some(GUARDIAN_EMAIL_INDEX),
                "guardian_email",
                guardian_email,
            )
            .await?;
        let legacy = self
            .query_items(
                &self.legacy_table_name,
                Some(LEGACY_EMAIL_INDEX),
                "email",
                guardian_email,
            )
            .await?;
        Self::collect_generations(current, legacy)
    }

    async fn put_attendee_if_inactive(&self, record: AttendeeRecord) -> Result<()> {
        self.conditional_put(
            record,
            "attribute_not_exists(attendee_id) OR #status <> :active",
            true,
        )
        .await
    }

    async fn insert_attendee_if_absent(&self, record: AttendeeRecord) -> Result<()> {
        self.conditional_put(record, "attribute_not_exists(attendee_id)", false)
            .await
    }

    async fn transition_attendee(
        &self,
        event_id: &str,
        attendee_id: &str,
        transition: AttendeeTransition,
    ) -> Result<AttendeeRecord> {
        let mut update = "SET #status = :to, updated_at = :at".to_string();
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("event_id", s(event_id))
            .key("attendee_id", s(attendee_id))
            .condition_expression("#status = :from")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":from", s(transition.from.as_str()))
            .expression_attribute_values(":to", s(transition.to.as_str()))
            .expression_attribute_values(":at", s(transition.at.clone()))
            .return_values(ReturnValue::AllNew);

        match transition.to {
            AttendeeStatus::Cancelled => {
                update.push_str(", cancelled_at = :at");
                if let Some(reason) = &transition.reason {
                    update.push_str(", cancellation_reason = :reason");
                    request = request.expression_attribute_values(":reason", s(reason.clone()));
                }
                if let Some(hours) = transition.hours_before_event {
                    update.push_str(", hours_before_event = :hours");
                    request = request.expression_attribute_values(":hours", n(hours));
                }
            }
            AttendeeStatus::NoShow | AttendeeStatus::Attended => {
                update.push_str(", attendance_marked_at = :at");
            }
            AttendeeStatus::Active => {
                update.push_str(" REMOVE attendance_marked_at");
            }
        }

        let output = request
            .update_expression(update)
            .send()
            .await
            .map_err(|e| {
                StoreError::from_sdk(&format!("transition attendee {}/{}", event_id, attendee_id), e)
            })?;

        let attributes = output
            .attributes
            .ok_or_else(|| StoreError::Dynamo("update returned no attributes".to_string()))?;
        Ok(serde_dynamo::from_item(attributes)?)
    }
}

pub struct DynamoMinorStore {
    client: Client,
    table_name: String,
}

impl DynamoMinorStore {
    pub async fn new() -> Self {
        let table = Config::get().minors_table.clone();
        Self::with_client_and_table(create_client().await, table)
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl MinorStore for DynamoMinorStore {
    async fn list_minors(&self, guardian_email: &str) -> Result<Vec<Minor>> {
        let items: Vec<Item> = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("guardian_email = :g")
            .expression_attribute_values(":g", s(guardian_email))
            .into_paginator()
            .items()
            .send()
            .collect::<std::result::Result<Vec<_>, _>>()
            .await
            .map_err(|e| StoreError::from_sdk("list minors", e))?;
        Ok(serde_dynamo::from_items(items)?)
    }

    async fn get_minor(&self, guardian_email: &str, minor_id: &str) -> Result<Option<Minor>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("guardian_email", s(guardian_email))
            .key("minor_id", s(minor_id))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("get minor", e))?;

        output
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    async fn put_minor(&self, minor: Minor) -> Result<Minor> {
        let item: Item = serde_dynamo::to_item(&minor)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("put minor", e))?;
        Ok(minor)
    }

    async fn delete_minor(&self, guardian_email: &str, minor_id: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("guardian_email", s(guardian_email))
            .key("minor_id", s(minor_id))
            .condition_expression("attribute_exists(minor_id)")
            .send()
            .await
            .map_err(|e| match StoreError::from_sdk("delete minor", e) {
                StoreError::ConditionFailed(_) => {
                    StoreError::NotFound(format!("minor {}", minor_id))
                }
                other => other,
            })?;
        Ok(())
    }
}

pub struct DynamoVolunteerStore {
    client: Client,
    table_name: String,
}

impl DynamoVolunteerStore {
    pub async fn new() -> Self {
        let table = Config::get().volunteers_table.clone();
        Self::with_client_and_table(create_client().await, table)
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }

    async fn add_to_metric(&self, email: &str, metric: MetricDelta, by: i64) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key("email", s(email))
            .update_expression("ADD volunteer_metrics.#metric :by")
            .condition_expression("attribute_exists(email) AND attribute_exists(volunteer_metrics)")
            .expression_attribute_names("#metric", metric.attribute())
            .expression_attribute_values(":by", n(by))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("increment volunteer metric", e))?;
        Ok(())
    }
}

#[async_trait]
impl VolunteerStore for DynamoVolunteerStore {
    async fn get_volunteer(&self, email: &str) -> Result<Option<Volunteer>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("email", s(email))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("get volunteer", e))?;

        output
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    async fn increment_metric(&self, email: &str, metric: MetricDelta, by: i64) -> Result<()> {
        match self.add_to_metric(email, metric, by).await {
            Err(StoreError::ConditionFailed(_)) => {}
            other => return other,
        }

        // Either the volunteer is unknown or the metrics map was never created.
        let mut metrics = VolunteerMetrics::default();
        metric.apply(&mut metrics, by);
        let metrics_item: Item = serde_dynamo::to_item(&metrics)?;
        let seeded = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("email", s(email))
            .update_expression("SET volunteer_metrics = :metrics")
            .condition_expression("attribute_exists(email) AND attribute_not_exists(volunteer_metrics)")
            .expression_attribute_values(":metrics", AttributeValue::M(metrics_item))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("seed volunteer metrics", e));

        match seeded {
            Ok(_) => Ok(()),
            // Lost a race with another seeder; the map exists now.
            Err(StoreError::ConditionFailed(_)) => {
                match self.add_to_metric(email, metric, by).await {
                    Err(StoreError::ConditionFailed(_)) => {
                        Err(StoreError::NotFound(format!("volunteer {}", email)))
                    }
                    other => other,
                }
            }
            Err(e) => Err(e),
        }
    }
}

pub struct DynamoSessionStore {
    client: Client,
    table_name: String,
}

impl DynamoSessionStore {
    pub async fn new() -> Self {
        let table = Config::get().sessions_table.clone();
        Self::with_client_and_table(create_client().await, table)
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl SessionStore for DynamoSessionStore {
    async fn get_session(&self, session_token: &str) -> Result<Option<Session>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("session_token", s(session_token))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("get session", e))?;

        output
            .item
            .map(|item| serde_dynamo::from_item(item).map_err(StoreError::from))
            .transpose()
    }

    async fn delete_session(&self, session_token: &str) -> Result<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("session_token", s(session_token))
            .send()
            .await
            .map_err(|e| StoreError::from_sdk("delete session", e))?;
        Ok(())
    }
}
