use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::directory::Directory;
use crate::error::{ConflictReason, WorkflowError};
use crate::model::leave_request::{
    Applicant, AuditAction, AuditEntry, DateRange, Decision, LeaveId, LeaveRequest, LeaveType,
};
use crate::store::{LeaveDraft, LeaveStore, UpdateOutcome};
use crate::utils::clock::Clock;
use crate::workflow::{ApprovalChainBuilder, RequestNumbering, WorkflowSettings};

/// Submission payload. Every field is optional at the wire level so a
/// missing one is reported as a validation error rather than a parse error.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LeaveForm {
    #[schema(example = "annual")]
    pub leave_type: Option<LeaveType>,
    #[serde(default)]
    pub leave_dates: Vec<DateRange>,
    #[schema(example = 2.0)]
    /// Length in days
    pub leave_length: Option<f64>,
    #[schema(example = "family trip")]
    pub reason: Option<String>,
}

struct LeaveDetails {
    leave_type: LeaveType,
    leave_dates: Vec<DateRange>,
    leave_length: f64,
    reason: String,
}

impl LeaveForm {
    fn validate(self) -> Result<LeaveDetails, WorkflowError> {
        let leave_type = self
            .leave_type
            .ok_or_else(|| WorkflowError::Validation("leave_type is required".to_string()))?;

        if self.leave_dates.is_empty() {
            return Err(WorkflowError::Validation(
                "leave_dates must contain at least one range".to_string(),
            ));
        }
        if let Some(bad) = self.leave_dates.iter().find(|r| r.start > r.end) {
            return Err(WorkflowError::Validation(format!(
                "leave range starting {} ends before it starts",
                bad.start
            )));
        }

        let leave_length = match self.leave_length {
            Some(len) if len.is_finite() && len > 0.0 => len,
            Some(_) => {
                return Err(WorkflowError::Validation(
                    "leave_length must be a positive number of days".to_string(),
                ));
            }
            None => return Err(WorkflowError::Validation("leave_length is required".to_string())),
        };

        let reason = self.reason.map(|r| r.trim().to_string()).unwrap_or_default();
        if reason.is_empty() {
            return Err(WorkflowError::Validation("reason is required".to_string()));
        }

        Ok(LeaveDetails {
            leave_type,
            leave_dates: self.leave_dates,
            leave_length,
            reason,
        })
    }
}

fn clean_remark(remark: Option<String>) -> Option<String> {
    remark
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
}

/// Drives leave requests through their approval chain.
///
/// Holds no per-request state: every transition re-reads the record, checks
/// the guard against that fresh copy, and writes back through the store's
/// conditional update. A write that finds the record moved on is reported as
/// [`ConflictReason::ConcurrentUpdate`].
pub struct LeaveWorkflow {
    store: Arc<dyn LeaveStore>,
    directory: Arc<dyn Directory>,
    clock: Arc<dyn Clock>,
    chains: ApprovalChainBuilder,
    numbering: RequestNumbering,
}

impl LeaveWorkflow {
    pub fn new(
        store: Arc<dyn LeaveStore>,
        directory: Arc<dyn Directory>,
        clock: Arc<dyn Clock>,
        settings: &WorkflowSettings,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            chains: ApprovalChainBuilder::new(settings.approval_order),
            numbering: RequestNumbering::new(
                settings.apply_number_prefix.clone(),
                settings.numbering,
                settings.numbering_max_attempts,
            ),
        }
    }

    #[instrument(name = "leave_submit", skip(self, caller, form), fields(caller = caller.user_id))]
    pub async fn submit(&self, caller: &AuthUser, form: LeaveForm) -> Result<LeaveRequest, WorkflowError> {
        let details = form.validate()?;
        let chain = self.chains.build(self.directory.as_ref(), caller.user_id).await?;
        let Some(first) = chain.approvers.first() else {
            return Err(WorkflowError::Validation("approval chain is empty".to_string()));
        };

        let now = self.clock.now();
        let created = AuditEntry {
            actor: caller.actor(),
            action: AuditAction::Created,
            description: format!(
                "{} submitted the request, waiting on {}",
                caller.username, first.user_name
            ),
            remark: None,
            at: now.with_timezone(&Utc),
        };

        let draft = LeaveDraft {
            leave_type: details.leave_type,
            leave_dates: details.leave_dates,
            leave_length: details.leave_length,
            reason: details.reason,
            applicant: Applicant {
                user_id: caller.user_id,
                user_name: caller.username.clone(),
                department: chain.home_department.clone(),
            },
            approval_chain: chain.approvers,
            created,
        };

        let request = self
            .numbering
            .create_numbered(self.store.as_ref(), draft, now)
            .await?;

        info!(
            leave_id = request.id,
            apply_number = %request.apply_number,
            chain_len = request.approval_chain.len(),
            "Leave request submitted"
        );
        Ok(request)
    }

    #[instrument(name = "leave_cancel", skip(self, caller, remark), fields(caller = caller.user_id))]
    pub async fn cancel(
        &self,
        caller: &AuthUser,
        id: LeaveId,
        remark: Option<String>,
    ) -> Result<LeaveRequest, WorkflowError> {
        self.transition(caller, id, Decision::Cancel, clean_remark(remark))
            .await
    }

    #[instrument(name = "leave_approve", skip(self, caller, remark), fields(caller = caller.user_id))]
    pub async fn approve(
        &self,
        caller: &AuthUser,
        id: LeaveId,
        remark: Option<String>,
    ) -> Result<LeaveRequest, WorkflowError> {
        self.transition(caller, id, Decision::Approve, clean_remark(remark))
            .await
    }

    #[instrument(name = "leave_reject", skip(self, caller, remark), fields(caller = caller.user_id))]
    pub async fn reject(
        &self,
        caller: &AuthUser,
        id: LeaveId,
        remark: Option<String>,
    ) -> Result<LeaveRequest, WorkflowError> {
        let Some(remark) = clean_remark(remark) else {
            return Err(WorkflowError::Validation(
                "a remark is required to reject a leave request".to_string(),
            ));
        };
        self.transition(caller, id, Decision::Reject, Some(remark))
            .await
    }

    /// A single request, visible to its applicant, its approvers and admins.
    pub async fn detail(&self, caller: &AuthUser, id: LeaveId) -> Result<LeaveRequest, WorkflowError> {
        let request = self.load(id).await?;
        if caller.is_admin() || request.involves(caller.user_id) {
            Ok(request)
        } else {
            Err(WorkflowError::Authorization(format!(
                "leave request {} is not visible to user {}",
                id, caller.user_id
            )))
        }
    }

    async fn load(&self, id: LeaveId) -> Result<LeaveRequest, WorkflowError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("leave request {} not found", id)))
    }

    async fn transition(
        &self,
        caller: &AuthUser,
        id: LeaveId,
        decision: Decision,
        remark: Option<String>,
    ) -> Result<LeaveRequest, WorkflowError> {
        let mut current = self.load(id).await?;
        let at = self.clock.now().with_timezone(&Utc);

        let transition = current
            .decide(&caller.actor(), decision, remark, at)
            .inspect_err(|e| warn!(leave_id = id, ?decision, error = %e, "Leave transition refused"))?;

        match self.store.conditional_update(id, &transition).await? {
            UpdateOutcome::Applied => {
                info!(
                    leave_id = id,
                    status = %transition.next.status(),
                    step = transition.next.step(),
                    "Leave request transitioned"
                );
                current.apply(transition);
                Ok(current)
            }
            UpdateOutcome::Conflict => {
                warn!(leave_id = id, ?decision, "Leave request moved on before the write, discarded");
                Err(WorkflowError::StateConflict(ConflictReason::ConcurrentUpdate))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::auth::tests::named_caller;
    use crate::directory::MemoryDirectory;
    use crate::model::department::Department;
    use crate::model::leave_request::tests::approver;
    use crate::model::leave_request::{ApprovalState, LeaveStatus, Transition};
    use crate::model::role::Role;
    use crate::store::{
        LeaveFilter, MemoryLeaveStore, NewLeaveRequest, PartyFilter, StatusFilter, StoreError,
    };
    use crate::utils::clock::TickingClock;
    use crate::workflow::{LeaveQueries, LeaveQuery, NumberingStrategy, QueryRole};
    use async_trait::async_trait;
    use chrono::{DateTime, Local, NaiveDate, TimeZone};
    use futures::future::join_all;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const APPLICANT: u64 = 100;
    const SOLO: u64 = 200;
    const TRIPLE: u64 = 300;
    const LONER: u64 = 400;

    struct Fixture {
        store: Arc<MemoryLeaveStore>,
        directory: Arc<MemoryDirectory>,
        workflow: LeaveWorkflow,
    }

    fn fixture_with(settings: WorkflowSettings) -> Fixture {
        let directory = MemoryDirectory::new();
        for (id, name, approver_id, approver_name) in [
            (1, "Ops", 10, "ann"),
            (2, "Finance", 20, "bob"),
            (3, "Legal", 30, "cat"),
        ] {
            directory
                .put_department(Department {
                    id,
                    name: name.to_string(),
                    approver: Some(approver(approver_id, approver_name)),
                })
                .unwrap();
        }
        directory.set_memberships(APPLICANT, vec![1, 2]).unwrap();
        directory.set_memberships(SOLO, vec![1]).unwrap();
        directory.set_memberships(TRIPLE, vec![1, 2, 3]).unwrap();

        let store = Arc::new(MemoryLeaveStore::new());
        let directory = Arc::new(directory);
        let clock = TickingClock::starting_at(Local.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap());
        let workflow = LeaveWorkflow::new(store.clone(), directory.clone(), Arc::new(clock), &settings);
        Fixture {
            store,
            directory,
            workflow,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(WorkflowSettings::default())
    }

    fn user(id: u64) -> AuthUser {
        let name = match id {
            10 => "ann",
            20 => "bob",
            30 => "cat",
            _ => "staff",
        };
        named_caller(id, name, Role::Employee)
    }

    fn form() -> LeaveForm {
        LeaveForm {
            leave_type: Some(LeaveType::Annual),
            leave_dates: vec![DateRange {
                start: NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 11, 3).unwrap(),
            }],
            leave_length: Some(2.0),
            reason: Some("  visiting family  ".to_string()),
        }
    }

    async fn stored(fx: &Fixture, id: LeaveId) -> LeaveRequest {
        fx.store.get(id).await.unwrap().unwrap()
    }

    #[actix_web::test]
    async fn two_department_chain_walks_to_approved() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();

        let chain: Vec<u64> = created.approval_chain.iter().map(|a| a.user_id).collect();
        assert_eq!(chain, vec![10, 20]);
        assert_eq!(created.status(), LeaveStatus::PendingReview);
        assert_eq!(created.current_approver().map(|a| a.user_id), Some(10));
        assert_eq!(created.apply_number, "XJ-202610191");
        assert_eq!(created.reason, "visiting family");
        assert_eq!(created.applicant.department.as_deref(), Some("Ops"));
        assert_eq!(created.audit_log.len(), 1);

        let handed_over = fx.workflow.approve(&user(10), created.id, None).await.unwrap();
        assert_eq!(handed_over.current_step(), 1);
        assert_eq!(handed_over.status(), LeaveStatus::InReview);
        assert_eq!(handed_over.current_approver().map(|a| a.user_id), Some(20));

        let err = fx.workflow.approve(&user(10), created.id, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authorization(_)));

        let done = fx.workflow.approve(&user(20), created.id, None).await.unwrap();
        assert_eq!(done.status(), LeaveStatus::Approved);

        let persisted = stored(&fx, created.id).await;
        assert_eq!(persisted.status(), LeaveStatus::Approved);
        let actions: Vec<AuditAction> = persisted.audit_log.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Created, AuditAction::Approved, AuditAction::FinalApproved]
        );
    }

    #[actix_web::test]
    async fn single_approver_is_approved_in_one_step() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(SOLO), form()).await.unwrap();
        assert_eq!(created.approval_chain.len(), 1);

        let done = fx.workflow.approve(&user(10), created.id, Some("enjoy".into())).await.unwrap();
        assert_eq!(done.status(), LeaveStatus::Approved);
        assert_eq!(done.audit_log.last().and_then(|e| e.remark.as_deref()), Some("enjoy"));
    }

    #[actix_web::test]
    async fn steps_advance_by_one_and_log_grows_append_only() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(TRIPLE), form()).await.unwrap();
        let mut previous = created.audit_log.clone();
        let mut last_step = created.current_step();

        for (k, approver_id) in [10, 20, 30].into_iter().enumerate() {
            let after = fx.workflow.approve(&user(approver_id), created.id, None).await.unwrap();
            let persisted = stored(&fx, created.id).await;

            assert_eq!(persisted.audit_log.len(), k + 2);
            assert_eq!(&persisted.audit_log[..previous.len()], previous.as_slice());
            assert!(persisted.audit_log.windows(2).all(|w| w[0].at < w[1].at));

            if k < 2 {
                assert_eq!(after.status(), LeaveStatus::InReview);
                assert_eq!(after.current_step(), last_step + 1);
            } else {
                assert_eq!(after.status(), LeaveStatus::Approved);
                assert_eq!(after.current_step(), last_step);
            }
            last_step = after.current_step();
            previous = persisted.audit_log;
        }
    }

    #[actix_web::test]
    async fn wrong_approver_leaves_state_untouched() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();

        for who in [20, APPLICANT, 999] {
            let approve = fx.workflow.approve(&user(who), created.id, None).await.unwrap_err();
            assert!(matches!(approve, WorkflowError::Authorization(_)));
            let reject = fx
                .workflow
                .reject(&user(who), created.id, Some("no".into()))
                .await
                .unwrap_err();
            assert!(matches!(reject, WorkflowError::Authorization(_)));
        }

        let persisted = stored(&fx, created.id).await;
        assert_eq!(persisted.state, ApprovalState::Open { step: 0 });
        assert_eq!(persisted.audit_log.len(), 1);
    }

    #[actix_web::test]
    async fn reject_needs_a_remark_and_records_it() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();

        let err = fx.workflow.reject(&user(10), created.id, Some("   ".into())).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let rejected = fx
            .workflow
            .reject(&user(10), created.id, Some("peak season".into()))
            .await
            .unwrap();
        assert_eq!(rejected.status(), LeaveStatus::Rejected);
        let entry = rejected.audit_log.last().unwrap();
        assert_eq!(entry.action, AuditAction::Rejected);
        assert_eq!(entry.remark.as_deref(), Some("peak season"));

        let err = fx.workflow.approve(&user(10), created.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::StateConflict(ConflictReason::AlreadyTerminal(LeaveStatus::Rejected))
        ));
    }

    #[actix_web::test]
    async fn cancel_only_while_open_and_only_by_applicant() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();
        fx.workflow.approve(&user(10), created.id, None).await.unwrap();

        let err = fx.workflow.cancel(&user(20), created.id, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authorization(_)));

        let cancelled = fx
            .workflow
            .cancel(&user(APPLICANT), created.id, Some("plans changed".into()))
            .await
            .unwrap();
        assert_eq!(cancelled.status(), LeaveStatus::Cancelled);
        assert_eq!(cancelled.current_step(), 1);
        assert_eq!(cancelled.audit_log.len(), 3);

        let again = fx.workflow.cancel(&user(APPLICANT), created.id, None).await.unwrap_err();
        assert!(matches!(
            again,
            WorkflowError::StateConflict(ConflictReason::AlreadyTerminal(LeaveStatus::Cancelled))
        ));

        let solo = fx.workflow.submit(&user(SOLO), form()).await.unwrap();
        fx.workflow.approve(&user(10), solo.id, None).await.unwrap();
        let err = fx.workflow.cancel(&user(SOLO), solo.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::StateConflict(ConflictReason::AlreadyTerminal(LeaveStatus::Approved))
        ));
    }

    #[actix_web::test]
    async fn submitter_without_departments_creates_nothing() {
        let fx = fixture();
        let err = fx.workflow.submit(&user(LONER), form()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let everything = LeaveFilter {
            status: StatusFilter::Any,
            party: PartyFilter::Anyone,
        };
        assert_eq!(fx.store.count(&everything).await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn incomplete_forms_are_rejected_before_any_lookup() {
        let fx = fixture();
        let cases = [
            LeaveForm { leave_type: None, ..form() },
            LeaveForm { leave_dates: vec![], ..form() },
            LeaveForm {
                leave_dates: vec![DateRange {
                    start: NaiveDate::from_ymd_opt(2026, 11, 5).unwrap(),
                    end: NaiveDate::from_ymd_opt(2026, 11, 4).unwrap(),
                }],
                ..form()
            },
            LeaveForm { leave_length: Some(0.0), ..form() },
            LeaveForm { leave_length: None, ..form() },
            LeaveForm { reason: Some(" ".into()), ..form() },
        ];
        for case in cases {
            let err = fx.workflow.submit(&user(LONER), case).await.unwrap_err();
            assert!(matches!(err, WorkflowError::Validation(_)), "{err}");
        }
    }

    #[actix_web::test]
    async fn unknown_request_is_not_found() {
        let fx = fixture();
        let err = fx.workflow.approve(&user(10), 404, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
        let err = fx.workflow.detail(&user(10), 404).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[actix_web::test]
    async fn chain_is_a_snapshot_of_creation_time() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();

        fx.directory
            .put_department(Department {
                id: 1,
                name: "Ops".to_string(),
                approver: Some(approver(11, "new-lead")),
            })
            .unwrap();

        let err = fx.workflow.approve(&user(11), created.id, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authorization(_)));
        fx.workflow.approve(&user(10), created.id, None).await.unwrap();

        let later = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();
        assert_eq!(later.approval_chain[0].user_id, 11);
    }

    #[actix_web::test]
    async fn reversed_order_starts_with_last_department() {
        let fx = fixture_with(WorkflowSettings {
            approval_order: crate::workflow::ApprovalOrder::Reversed,
            ..WorkflowSettings::default()
        });
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();
        assert_eq!(created.current_approver().map(|a| a.user_id), Some(20));
    }

    #[actix_web::test]
    async fn detail_is_limited_to_involved_users_and_admins() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();

        for who in [user(APPLICANT), user(20), named_caller(1, "root", Role::Admin)] {
            assert_eq!(fx.workflow.detail(&who, created.id).await.unwrap().id, created.id);
        }
        let err = fx.workflow.detail(&user(30), created.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Authorization(_)));
    }

    /// Hands control back to the executor after every read, so concurrent
    /// callers sharing one task all read before any of them writes.
    struct YieldingStore {
        inner: Arc<MemoryLeaveStore>,
        duplicates: AtomicUsize,
    }

    impl YieldingStore {
        fn over(inner: Arc<MemoryLeaveStore>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                duplicates: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LeaveStore for YieldingStore {
        async fn get(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError> {
            let found = self.inner.get(id).await;
            actix_web::rt::task::yield_now().await;
            found
        }
        async fn create(&self, new: NewLeaveRequest) -> Result<LeaveRequest, StoreError> {
            let created = self.inner.create(new).await;
            if let Err(StoreError::DuplicateApplyNumber(_)) = &created {
                self.duplicates.fetch_add(1, Ordering::SeqCst);
            }
            created
        }
        async fn conditional_update(
            &self,
            id: LeaveId,
            transition: &Transition,
        ) -> Result<UpdateOutcome, StoreError> {
            self.inner.conditional_update(id, transition).await
        }
        async fn count(&self, filter: &LeaveFilter) -> Result<u64, StoreError> {
            self.inner.count(filter).await
        }
        async fn find(
            &self,
            filter: &LeaveFilter,
            skip: u64,
            limit: u64,
        ) -> Result<Vec<LeaveRequest>, StoreError> {
            self.inner.find(filter, skip, limit).await
        }
        async fn next_daily_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
            let n = self.inner.next_daily_sequence(day).await;
            actix_web::rt::task::yield_now().await;
            n
        }
        async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
            let n = self.inner.count_created_since(since).await;
            actix_web::rt::task::yield_now().await;
            n
        }
    }

    fn yielding_workflow(fx: &Fixture, store: Arc<YieldingStore>, settings: &WorkflowSettings) -> LeaveWorkflow {
        LeaveWorkflow::new(
            store,
            fx.directory.clone(),
            Arc::new(TickingClock::starting_at(
                Local.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
            )),
            settings,
        )
    }

    /// Returns how many inserts hit an already issued number.
    async fn assert_unique_numbers(settings: WorkflowSettings) -> usize {
        const SUBMISSIONS: usize = 25;
        let fx = fixture();
        let store = YieldingStore::over(fx.store.clone());
        let workflow = yielding_workflow(&fx, store.clone(), &settings);
        let caller = user(APPLICANT);
        let submissions = (0..SUBMISSIONS).map(|_| workflow.submit(&caller, form()));
        let results = join_all(submissions).await;

        let numbers: HashSet<String> = results
            .into_iter()
            .map(|r| r.unwrap().apply_number)
            .collect();
        assert_eq!(numbers.len(), SUBMISSIONS);
        assert!(numbers.iter().all(|n| n.starts_with("XJ-20261019")));
        store.duplicates.load(Ordering::SeqCst)
    }

    #[actix_web::test]
    async fn concurrent_same_day_submissions_get_distinct_numbers() {
        let clashes = assert_unique_numbers(WorkflowSettings::default()).await;
        assert_eq!(clashes, 0);

        let clashes = assert_unique_numbers(WorkflowSettings {
            numbering: NumberingStrategy::DayCount,
            numbering_max_attempts: 25,
            ..WorkflowSettings::default()
        })
        .await;
        assert!(clashes > 0);
    }

    /// Serves a fixed, possibly outdated snapshot for reads and passes every
    /// write through, like a reader that loaded the record just before another
    /// writer committed.
    struct StaleReads {
        inner: Arc<MemoryLeaveStore>,
        snapshot: LeaveRequest,
    }

    #[async_trait]
    impl LeaveStore for StaleReads {
        async fn get(&self, _id: LeaveId) -> Result<Option<LeaveRequest>, StoreError> {
            Ok(Some(self.snapshot.clone()))
        }
        async fn create(&self, new: NewLeaveRequest) -> Result<LeaveRequest, StoreError> {
            self.inner.create(new).await
        }
        async fn conditional_update(
            &self,
            id: LeaveId,
            transition: &Transition,
        ) -> Result<UpdateOutcome, StoreError> {
            self.inner.conditional_update(id, transition).await
        }
        async fn count(&self, filter: &LeaveFilter) -> Result<u64, StoreError> {
            self.inner.count(filter).await
        }
        async fn find(
            &self,
            filter: &LeaveFilter,
            skip: u64,
            limit: u64,
        ) -> Result<Vec<LeaveRequest>, StoreError> {
            self.inner.find(filter, skip, limit).await
        }
        async fn next_daily_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
            self.inner.next_daily_sequence(day).await
        }
        async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
            self.inner.count_created_since(since).await
        }
    }

    #[actix_web::test]
    async fn racing_approvals_advance_exactly_one_step() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();
        let snapshot = stored(&fx, created.id).await;

        let stale = LeaveWorkflow::new(
            Arc::new(StaleReads {
                inner: fx.store.clone(),
                snapshot,
            }),
            fx.directory.clone(),
            Arc::new(TickingClock::starting_at(
                Local.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap(),
            )),
            &WorkflowSettings::default(),
        );

        fx.workflow.approve(&user(10), created.id, None).await.unwrap();
        let err = stale.approve(&user(10), created.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::StateConflict(ConflictReason::ConcurrentUpdate)
        ));

        let persisted = stored(&fx, created.id).await;
        assert_eq!(persisted.current_step(), 1);
        assert_eq!(persisted.audit_log.len(), 2);
    }

    #[actix_web::test]
    async fn interleaved_approvals_leave_one_winner_and_one_conflict() {
        let fx = fixture();
        let created = fx.workflow.submit(&user(TRIPLE), form()).await.unwrap();
        let workflow = yielding_workflow(&fx, YieldingStore::over(fx.store.clone()), &WorkflowSettings::default());
        let ann = user(10);

        let (a, b) = futures::join!(
            workflow.approve(&ann, created.id, None),
            workflow.approve(&ann, created.id, None)
        );
        let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
        assert_eq!(winner.unwrap().current_step(), 1);
        assert!(matches!(
            loser.unwrap_err(),
            WorkflowError::StateConflict(ConflictReason::ConcurrentUpdate)
        ));

        let persisted = stored(&fx, created.id).await;
        assert_eq!(persisted.current_step(), 1);
        assert_eq!(persisted.audit_log.len(), 2);
    }

    #[actix_web::test]
    async fn queries_follow_the_audit_rule() {
        let fx = fixture();
        let queries = LeaveQueries::new(fx.store.clone(), 100);

        let first = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();
        let second = fx.workflow.submit(&user(APPLICANT), form()).await.unwrap();
        let solo = fx.workflow.submit(&user(SOLO), form()).await.unwrap();

        fx.workflow.approve(&user(10), first.id, None).await.unwrap();
        fx.workflow.approve(&user(10), solo.id, None).await.unwrap();

        assert_eq!(queries.pending_count(&user(10)).await.unwrap(), 1);
        assert_eq!(queries.pending_count(&user(20)).await.unwrap(), 1);

        let audit = |apply_state| LeaveQuery {
            apply_state,
            role: Some(QueryRole::Audit),
            ..LeaveQuery::default()
        };

        let waiting: Vec<LeaveId> = queries
            .list(&user(10), &audit(Some(1)))
            .await
            .unwrap()
            .items
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(waiting, vec![second.id]);

        let finished = queries.list(&user(10), &audit(Some(3))).await.unwrap();
        assert_eq!(finished.total, 1);
        assert_eq!(finished.items[0].id, solo.id);

        let everything = queries.list(&user(10), &audit(None)).await.unwrap();
        assert_eq!(everything.total, 2);

        let mine = LeaveQuery {
            page_size: Some(1),
            page: Some(2),
            ..LeaveQuery::default()
        };
        let page = queries.list(&user(APPLICANT), &mine).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, second.id);
    }
}
