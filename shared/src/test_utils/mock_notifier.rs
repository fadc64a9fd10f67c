use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::models::CancellationNotice;
use crate::notify::{NotificationError, Notifier};

/// Keeps every published notice; publishing to a `fail_for` address errors.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<CancellationNotice>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<CancellationNotice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fail_for(&self, email: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(email.to_string());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish_cancellation(
        &self,
        notice: &CancellationNotice,
    ) -> Result<(), NotificationError> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&notice.volunteer_email);
        if failing {
            return Err(NotificationError::PublishFailed(format!(
                "topic rejected message for {}",
                notice.volunteer_email
            )));
        }
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice.clone());
        Ok(())
    }
}
