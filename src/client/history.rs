//! # Operation History
//!
//! Stopped operations as reported by `GET /operations`, newest first, with the
//! repetition counts and day grouping used by the history list.
//!
//! A repetition is a stopped operation with the same equipment, activity and
//! material as another. The count shown next to a running operation is the
//! history count plus the operation's in-memory repeat count.

use crate::client::api::RemoteOperationService;
use crate::client::operation::ActiveOperationState;
use crate::shared::models::{is_local_id, Operation, OperationKey, UpdateOperationRequest};
use crate::shared::{Result, TrackError};
use chrono::{Local, NaiveDate, TimeZone};

/// Operations with the same triple finished on the same day
#[derive(Debug, Clone, PartialEq)]
pub struct OperationGroup {
    pub key: OperationKey,
    /// Newest first
    pub operations: Vec<Operation>,
}

impl OperationGroup {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The operation shown for the whole group
    pub fn representative(&self) -> Option<&Operation> {
        self.operations.first()
    }

    pub fn total_duration_secs(&self) -> u64 {
        self.operations.iter().map(duration_secs).sum()
    }

    pub fn average_duration_secs(&self) -> u64 {
        match self.operations.len() {
            0 => 0,
            n => self.total_duration_secs() / n as u64,
        }
    }
}

/// One calendar day of history
#[derive(Debug, Clone, PartialEq)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub groups: Vec<OperationGroup>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationHistory {
    stopped: Vec<Operation>,
}

impl OperationHistory {
    /// Keep the stopped operations, most recently finished first
    pub fn from_operations(operations: Vec<Operation>) -> Self {
        let mut stopped: Vec<Operation> = operations
            .into_iter()
            .filter(Operation::is_stopped)
            .collect();
        stopped.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        Self { stopped }
    }

    pub async fn fetch(remote: &dyn RemoteOperationService) -> Result<Self> {
        let operations = remote.list_operations().await?;
        let history = Self::from_operations(operations);
        tracing::debug!("[API] Loaded {} stopped operations", history.stopped.len());
        Ok(history)
    }

    pub fn stopped(&self) -> &[Operation] {
        &self.stopped
    }

    pub fn is_empty(&self) -> bool {
        self.stopped.is_empty()
    }

    /// Stopped operations sharing `key`
    pub fn count_for(&self, key: &OperationKey) -> usize {
        self.stopped.iter().filter(|op| &op.key() == key).count()
    }

    /// Total shown next to the running operation
    pub fn display_count(&self, active: &ActiveOperationState) -> usize {
        self.count_for(&active.key()) + active.repeat_count as usize
    }

    /// Group by the local calendar day the operation ended on
    pub fn groups_by_day(&self, active: Option<&ActiveOperationState>) -> Vec<DayGroup> {
        self.groups_by_day_in(&Local, active)
    }

    /// Group by calendar day in `tz`, newest day first, then by triple
    ///
    /// Triples are listed in the order they first appear within the day. A
    /// triple that matches the running operation is left out, since the
    /// running operation already shows its count.
    pub fn groups_by_day_in<Tz: TimeZone>(
        &self,
        tz: &Tz,
        active: Option<&ActiveOperationState>,
    ) -> Vec<DayGroup> {
        let active_key = active.map(ActiveOperationState::key);
        let mut days: Vec<DayGroup> = Vec::new();

        for op in &self.stopped {
            let Some(end) = op.end_time else { continue };
            let date = end.with_timezone(tz).date_naive();
            let key = op.key();

            let day = match days.iter().position(|day| day.date == date) {
                Some(index) => &mut days[index],
                None => {
                    days.push(DayGroup {
                        date,
                        groups: Vec::new(),
                    });
                    let last = days.len() - 1;
                    &mut days[last]
                }
            };

            match day.groups.iter_mut().find(|group| group.key == key) {
                Some(group) => group.operations.push(op.clone()),
                None => day.groups.push(OperationGroup {
                    key,
                    operations: vec![op.clone()],
                }),
            }
        }

        for day in &mut days {
            day.groups
                .retain(|group| active_key.as_ref() != Some(&group.key));
        }
        days.retain(|day| !day.groups.is_empty());
        days.sort_by(|a, b| b.date.cmp(&a.date));
        days
    }

    /// Edit the free-text detail of a stopped operation
    pub async fn update_details(
        &mut self,
        remote: &dyn RemoteOperationService,
        operation_id: &str,
        details: &str,
    ) -> Result<Operation> {
        if is_local_id(operation_id) {
            return Err(TrackError::validation(
                "operationId",
                "Operation has not reached the server yet",
            ));
        }

        let request = UpdateOperationRequest {
            activity_details: details.trim().to_string(),
        };
        let updated = remote.update_operation(operation_id, &request).await?;

        if let Some(entry) = self
            .stopped
            .iter_mut()
            .find(|op| op.id.as_deref() == Some(operation_id))
        {
            *entry = updated.clone();
        }
        Ok(updated)
    }
}

fn duration_secs(op: &Operation) -> u64 {
    op.end_time
        .map(|end| (end - op.start_time).num_seconds().max(0) as u64)
        .unwrap_or(0)
}
