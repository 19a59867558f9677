use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::model::leave_request::{LeaveId, LeaveRequest, Transition};
use crate::store::{LeaveFilter, LeaveStore, NewLeaveRequest, StoreError, UpdateOutcome};

#[derive(Default)]
struct MemoryState {
    last_id: LeaveId,
    records: BTreeMap<LeaveId, LeaveRequest>,
    apply_numbers: HashSet<String>,
    counters: HashMap<NaiveDate, u64>,
}

/// Process-local store. A single mutex makes every call atomic, which gives
/// the same guarantees as the MySQL store's unique index and guarded UPDATE.
#[derive(Default)]
pub struct MemoryLeaveStore {
    state: Mutex<MemoryState>,
}

impl MemoryLeaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl LeaveStore for MemoryLeaveStore {
    async fn get(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError> {
        Ok(self.lock()?.records.get(&id).cloned())
    }

    async fn create(&self, new: NewLeaveRequest) -> Result<LeaveRequest, StoreError> {
        let mut state = self.lock()?;
        if !state.apply_numbers.insert(new.apply_number.clone()) {
            return Err(StoreError::DuplicateApplyNumber(new.apply_number));
        }
        state.last_id += 1;
        let request = new.into_request(state.last_id);
        state.records.insert(request.id, request.clone());
        Ok(request)
    }

    async fn conditional_update(
        &self,
        id: LeaveId,
        transition: &Transition,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.lock()?;
        let Some(record) = state.records.get_mut(&id) else {
            return Ok(UpdateOutcome::Conflict);
        };
        if record.revision() != transition.expected {
            return Ok(UpdateOutcome::Conflict);
        }
        record.apply(transition.clone());
        Ok(UpdateOutcome::Applied)
    }

    async fn count(&self, filter: &LeaveFilter) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state.records.values().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn find(
        &self,
        filter: &LeaveFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .records
            .values()
            .filter(|r| filter.matches(r))
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn next_daily_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let seq = state.counters.entry(day).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let state = self.lock()?;
        Ok(state
            .records
            .values()
            .filter(|r| r.created_at >= since)
            .count() as u64)
    }
}
