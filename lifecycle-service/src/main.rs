use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use chrono::{DateTime, Utc};
use cleanup_shared::attendance::lifecycle::{LifecycleSweeper, SweepOutcome};
use cleanup_shared::attendance::AttendanceContext;
use cleanup_shared::config::Config;
use cleanup_shared::store::dynamo::create_client;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use log::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Lifecycle Service Lambda");

    let ctx = AttendanceContext::from_config(Config::get(), create_client().await);

    lambda_runtime::run(service_fn(|event| handler(event, ctx.clone()))).await?;

    Ok(())
}

async fn handler(_event: LambdaEvent<CloudWatchEvent>, ctx: AttendanceContext) -> Result<(), Error> {
    info!("Lifecycle sweep triggered");

    let outcome = run_sweep(&ctx, Utc::now())
        .await
        .map_err(|e| Error::from(format!("Lifecycle sweep failed: {}", e)))?;

    info!(
        "Lifecycle sweep completed. Updated {} events, {} failed",
        outcome.updated.len(),
        outcome.failed.len()
    );
    Ok(())
}

/// Completes every ended event, then logs how the remaining active events
/// break down. Only a failed completion query fails the run.
async fn run_sweep(
    ctx: &AttendanceContext,
    now: DateTime<Utc>,
) -> Result<SweepOutcome, cleanup_shared::attendance::AttendanceError> {
    let sweeper = LifecycleSweeper::new(ctx);
    let outcome = sweeper.sweep_completed(now).await?;

    for failure in &outcome.failed {
        error!(
            "Failed to complete event {}: {}",
            failure.event_id, failure.error
        );
    }

    match sweeper.categorize(now).await {
        Ok(categories) => {
            let (upcoming, current, past) = categories.counts();
            info!(
                "Active events: {} upcoming, {} in progress, {} past",
                upcoming, current, past
            );
        }
        Err(e) => warn!("Failed to categorize events: {}", e),
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cleanup_shared::models::{AttendeeStatus, EventStatus};
    use cleanup_shared::test_utils::fixtures::{active_event, guardian_record, TestContext};
    use cleanup_shared::test_utils::test_logging::init_test_logging;

    fn ended_event(t: &TestContext, id: &str) {
        let mut event = active_event(id, 10);
        event.start_time = Utc::now() - Duration::hours(6);
        event.end_time = Utc::now() - Duration::hours(3);
        event.active_count = Some(1);
        t.events.insert(event);
    }

    #[tokio::test]
    async fn sweep_completes_ended_events_only() {
        init_test_logging();
        let t = TestContext::new();
        ended_event(&t, "done");
        t.events.insert(active_event("upcoming", 10));
        t.attendees
            .insert(guardian_record("done", "g@x.com", AttendeeStatus::Active));

        let outcome = run_sweep(&t.ctx, Utc::now()).await.unwrap();
        assert_eq!(outcome.updated, vec!["done".to_string()]);
        assert!(outcome.failed.is_empty());
        assert_eq!(t.events.status("done"), Some(EventStatus::Completed));
        assert_eq!(t.events.status("upcoming"), Some(EventStatus::Active));
        // Completion leaves attendee records alone
        assert_eq!(
            t.attendees.get("done", "g@x.com").unwrap().status,
            AttendeeStatus::Active
        );
        assert_eq!(t.events.active_count("done"), Some(1));
    }

    #[tokio::test]
    async fn repeated_sweeps_are_no_ops() {
        init_test_logging();
        let t = TestContext::new();
        ended_event(&t, "a");
        ended_event(&t, "b");

        let first = run_sweep(&t.ctx, Utc::now()).await.unwrap();
        assert_eq!(first.updated.len(), 2);

        let second = run_sweep(&t.ctx, Utc::now()).await.unwrap();
        assert!(second.updated.is_empty());
        assert!(second.failed.is_empty());
    }
}
