use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::WorkflowError;
use crate::model::leave_request::{LeaveRequest, LeaveStatus};
use crate::store::{LeaveFilter, LeaveStore, PartyFilter, StatusFilter};

const DEFAULT_PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryRole {
    /// Requests the caller submitted.
    #[default]
    #[serde(rename = "self")]
    Own,
    /// Requests the caller has to act on, or once sat on the chain of.
    Audit,
    /// Every request; admins only.
    All,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LeaveQuery {
    #[schema(example = 1)]
    /// 0 = all, 1/2 = awaiting approval, 3 = approved, 4 = rejected, 5 = cancelled
    pub apply_state: Option<u8>,
    #[schema(example = "audit")]
    /// `self`, `audit` or `all` (admins)
    pub role: Option<QueryRole>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    #[schema(example = 10)]
    /// Pagination page size
    pub page_size: Option<u64>,
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

fn status_filter(apply_state: Option<u8>) -> Result<StatusFilter, WorkflowError> {
    match apply_state.unwrap_or(0) {
        0 => Ok(StatusFilter::Any),
        code => match LeaveStatus::from_code(code) {
            Some(status) if status.is_open() => Ok(StatusFilter::Open),
            Some(status) => Ok(StatusFilter::Exact(status)),
            None => Err(WorkflowError::Validation(format!(
                "apply_state must be between 0 and 5, got {}",
                code
            ))),
        },
    }
}

/// Read side of the leave flow. Never writes.
pub struct LeaveQueries {
    store: Arc<dyn LeaveStore>,
    max_page_size: u64,
}

impl LeaveQueries {
    pub fn new(store: Arc<dyn LeaveStore>, max_page_size: u64) -> Self {
        Self {
            store,
            max_page_size: max_page_size.max(1),
        }
    }

    pub fn filter_for(&self, caller: &AuthUser, query: &LeaveQuery) -> Result<LeaveFilter, WorkflowError> {
        let status = status_filter(query.apply_state)?;
        let party = match query.role.unwrap_or_default() {
            QueryRole::Own => PartyFilter::Applicant(caller.user_id),
            QueryRole::Audit => PartyFilter::Auditor(caller.user_id),
            QueryRole::All if caller.is_admin() => PartyFilter::Anyone,
            QueryRole::All => {
                return Err(WorkflowError::Authorization(
                    "only administrators can list every leave request".to_string(),
                ));
            }
        };
        Ok(LeaveFilter { status, party })
    }

    #[instrument(name = "leave_list", skip(self, caller, query), fields(caller = caller.user_id))]
    pub async fn list(
        &self,
        caller: &AuthUser,
        query: &LeaveQuery,
    ) -> Result<Page<LeaveRequest>, WorkflowError> {
        let filter = self.filter_for(caller, query)?;

        let page = query.page.unwrap_or(1);
        let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page == 0 || page_size == 0 {
            return Err(WorkflowError::Validation(
                "page and page_size must be at least 1".to_string(),
            ));
        }
        let page_size = page_size.min(self.max_page_size);
        let skip = (page - 1).saturating_mul(page_size);

        let total = self.store.count(&filter).await?;
        let items = self.store.find(&filter, skip, page_size).await?;

        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }

    /// Open requests waiting on the caller; uses the same rule as the audit listing.
    pub async fn pending_count(&self, caller: &AuthUser) -> Result<u64, WorkflowError> {
        let filter = LeaveFilter {
            status: StatusFilter::Open,
            party: PartyFilter::Auditor(caller.user_id),
        };
        Ok(self.store.count(&filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::auth::tests::caller;
    use crate::model::role::Role;
    use crate::store::MemoryLeaveStore;

    fn queries() -> LeaveQueries {
        LeaveQueries::new(Arc::new(MemoryLeaveStore::new()), 50)
    }

    fn query(apply_state: Option<u8>, role: Option<QueryRole>) -> LeaveQuery {
        LeaveQuery {
            apply_state,
            role,
            ..LeaveQuery::default()
        }
    }

    #[test]
    fn absent_state_and_role_mean_all_of_my_requests() {
        let filter = queries()
            .filter_for(&caller(7, Role::Employee), &LeaveQuery::default())
            .unwrap();
        assert_eq!(filter.status, StatusFilter::Any);
        assert_eq!(filter.party, PartyFilter::Applicant(7));
    }

    #[test]
    fn open_codes_collapse_and_terminal_codes_match_exactly() {
        let q = queries();
        let me = caller(7, Role::Employee);
        for code in [1, 2] {
            let f = q.filter_for(&me, &query(Some(code), Some(QueryRole::Audit))).unwrap();
            assert_eq!(f.status, StatusFilter::Open);
            assert_eq!(f.party, PartyFilter::Auditor(7));
        }
        let f = q.filter_for(&me, &query(Some(4), None)).unwrap();
        assert_eq!(f.status, StatusFilter::Exact(LeaveStatus::Rejected));

        let err = q.filter_for(&me, &query(Some(9), None)).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[test]
    fn listing_everything_is_admin_only() {
        let q = queries();
        let err = q
            .filter_for(&caller(7, Role::Employee), &query(None, Some(QueryRole::All)))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Authorization(_)));

        let f = q
            .filter_for(&caller(1, Role::Admin), &query(None, Some(QueryRole::All)))
            .unwrap();
        assert_eq!(f.party, PartyFilter::Anyone);
    }

    #[actix_web::test]
    async fn zero_page_or_size_is_rejected() {
        let q = queries();
        let me = caller(7, Role::Employee);
        let mut bad = LeaveQuery::default();
        bad.page = Some(0);
        assert!(matches!(q.list(&me, &bad).await, Err(WorkflowError::Validation(_))));

        bad.page = Some(1);
        bad.page_size = Some(0);
        assert!(matches!(q.list(&me, &bad).await, Err(WorkflowError::Validation(_))));
    }

    #[actix_web::test]
    async fn page_size_is_capped() {
        let q = queries();
        let mut big = LeaveQuery::default();
        big.page_size = Some(500);
        let page = q.list(&caller(7, Role::Employee), &big).await.unwrap();
        assert_eq!(page.page_size, 50);
        assert_eq!(page.page, 1);
        assert_eq!(page.total, 0);
    }

    #[test]
    fn role_parses_from_query_string_values() {
        let parsed: QueryRole = serde_json::from_str("\"self\"").unwrap();
        assert_eq!(parsed, QueryRole::Own);
        let parsed: QueryRole = serde_json::from_str("\"audit\"").unwrap();
        assert_eq!(parsed, QueryRole::Audit);
    }
}
