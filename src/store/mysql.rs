use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, MySqlPool};

use crate::model::leave_request::{
    Actor, Applicant, ApprovalState, Approver, AuditAction, AuditEntry, DateRange, LeaveId,
    LeaveRequest, LeaveStatus, LeaveType, Transition,
};
use crate::store::{
    LeaveFilter, LeaveStore, NewLeaveRequest, PartyFilter, StatusFilter, StoreError,
    UpdateOutcome,
};

const LEAVE_COLUMNS: &str = "id, apply_number, leave_type, leave_dates, leave_length, reason, \
     applicant, approval_chain, status, current_step, created_at, updated_at";

const OPEN_CODES: &str = "(1, 2)";
const CLOSED_CODES: &str = "(3, 4, 5)";

#[derive(FromRow)]
struct LeaveRow {
    id: u64,
    apply_number: String,
    leave_type: String,
    leave_dates: Json<Vec<DateRange>>,
    leave_length: f64,
    reason: String,
    applicant: Json<Applicant>,
    approval_chain: Json<Vec<Approver>>,
    status: u8,
    current_step: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AuditRow {
    leave_id: u64,
    actor_id: u64,
    actor_name: String,
    action: String,
    description: String,
    remark: Option<String>,
    created_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self) -> Result<AuditEntry, StoreError> {
        let action = AuditAction::from_str(&self.action)
            .map_err(|_| StoreError::Corrupt(format!("unknown audit action {}", self.action)))?;
        Ok(AuditEntry {
            actor: Actor {
                user_id: self.actor_id,
                user_name: self.actor_name,
            },
            action,
            description: self.description,
            remark: self.remark,
            at: self.created_at,
        })
    }
}

impl LeaveRow {
    fn into_request(self, audit_log: Vec<AuditEntry>) -> Result<LeaveRequest, StoreError> {
        let leave_type = LeaveType::from_str(&self.leave_type).map_err(|_| {
            StoreError::Corrupt(format!("leave {} has unknown type {}", self.id, self.leave_type))
        })?;
        let status = LeaveStatus::from_code(self.status).ok_or_else(|| {
            StoreError::Corrupt(format!("leave {} has unknown status {}", self.id, self.status))
        })?;
        let approval_chain = self.approval_chain.0;
        let state = ApprovalState::from_parts(status, self.current_step as usize, approval_chain.len())
            .map_err(|e| StoreError::Corrupt(format!("leave {}: {}", self.id, e)))?;

        Ok(LeaveRequest {
            id: self.id,
            apply_number: self.apply_number,
            leave_type,
            leave_dates: self.leave_dates.0,
            leave_length: self.leave_length,
            reason: self.reason,
            applicant: self.applicant.0,
            approval_chain,
            state,
            audit_log,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    U8(u8),
}

fn where_clause(filter: &LeaveFilter) -> (String, Vec<FilterValue>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    match filter.status {
        StatusFilter::Any => {}
        StatusFilter::Open => where_sql.push_str(&format!(" AND status IN {}", OPEN_CODES)),
        StatusFilter::Exact(status) => {
            where_sql.push_str(" AND status = ?");
            args.push(FilterValue::U8(status.code()));
        }
    }

    match filter.party {
        PartyFilter::Anyone => {}
        PartyFilter::Applicant(user_id) => {
            where_sql.push_str(" AND applicant_id = ?");
            args.push(FilterValue::U64(user_id));
        }
        PartyFilter::Auditor(user_id) => {
            where_sql.push_str(&format!(
                " AND ((status IN {} AND current_approver_id = ?) \
                 OR (status IN {} AND JSON_CONTAINS(approval_chain, JSON_OBJECT('user_id', ?))))",
                OPEN_CODES, CLOSED_CODES
            ));
            args.push(FilterValue::U64(user_id));
            args.push(FilterValue::U64(user_id));
        }
    }

    (where_sql, args)
}

fn is_duplicate_key(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code() == Some("23000".into());
    }
    false
}

pub struct MySqlLeaveStore {
    pool: MySqlPool,
}

impl MySqlLeaveStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn audit_logs(&self, ids: &[u64]) -> Result<HashMap<u64, Vec<AuditEntry>>, StoreError> {
        let mut logs: HashMap<u64, Vec<AuditEntry>> = HashMap::new();
        if ids.is_empty() {
            return Ok(logs);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT leave_id, actor_id, actor_name, action, description, remark, created_at
            FROM leave_audit_logs
            WHERE leave_id IN ({})
            ORDER BY leave_id, seq
            "#,
            placeholders
        );
        let mut query = sqlx::query_as::<_, AuditRow>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        for row in query.fetch_all(&self.pool).await? {
            let leave_id = row.leave_id;
            logs.entry(leave_id).or_default().push(row.into_entry()?);
        }
        Ok(logs)
    }

    async fn hydrate(&self, rows: Vec<LeaveRow>) -> Result<Vec<LeaveRequest>, StoreError> {
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        let mut logs = self.audit_logs(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let log = logs.remove(&row.id).unwrap_or_default();
                row.into_request(log)
            })
            .collect()
    }
}

#[async_trait]
impl LeaveStore for MySqlLeaveStore {
    async fn get(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError> {
        let sql = format!("SELECT {} FROM leave_requests WHERE id = ?", LEAVE_COLUMNS);
        let row = sqlx::query_as::<_, LeaveRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create(&self, new: NewLeaveRequest) -> Result<LeaveRequest, StoreError> {
        let draft = &new.draft;
        let first = draft
            .approval_chain
            .first()
            .ok_or_else(|| StoreError::Corrupt("approval chain is empty".to_string()))?;
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO leave_requests
                (apply_number, leave_type, leave_dates, leave_length, reason,
                 applicant_id, applicant, approval_chain, status, current_step,
                 current_approver_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#,
        )
        .bind(&new.apply_number)
        .bind(draft.leave_type.as_ref())
        .bind(Json(&draft.leave_dates))
        .bind(draft.leave_length)
        .bind(&draft.reason)
        .bind(draft.applicant.user_id)
        .bind(Json(&draft.applicant))
        .bind(Json(&draft.approval_chain))
        .bind(LeaveStatus::PendingReview.code())
        .bind(first.user_id)
        .bind(draft.created.at)
        .bind(draft.created.at)
        .execute(&mut *tx)
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_id(),
            Err(e) if is_duplicate_key(&e) => {
                return Err(StoreError::DuplicateApplyNumber(new.apply_number));
            }
            Err(e) => return Err(e.into()),
        };

        insert_audit_entry(&mut tx, id, 0, &draft.created).await?;
        tx.commit().await?;

        Ok(new.into_request(id))
    }

    async fn conditional_update(
        &self,
        id: LeaveId,
        transition: &Transition,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE leave_requests
            SET status = ?, current_step = ?, current_approver_id = ?, updated_at = ?
            WHERE id = ?
            AND status = ?
            AND current_step = ?
            "#,
        )
        .bind(transition.next.status().code())
        .bind(transition.next.step() as u32)
        .bind(transition.current_approver.user_id)
        .bind(transition.entry.at)
        .bind(id)
        .bind(transition.expected.status.code())
        .bind(transition.expected.step as u32)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(UpdateOutcome::Conflict);
        }

        // The guarded UPDATE holds the row lock, so the count is stable here.
        let seq = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leave_audit_logs WHERE leave_id = ?",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        insert_audit_entry(&mut tx, id, seq as u32, &transition.entry).await?;
        tx.commit().await?;

        Ok(UpdateOutcome::Applied)
    }

    async fn count(&self, filter: &LeaveFilter) -> Result<u64, StoreError> {
        let (where_sql, args) = where_clause(filter);
        let count_sql = format!("SELECT COUNT(*) FROM leave_requests{}", where_sql);

        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::U8(v) => count_q.bind(*v),
            };
        }

        let total = count_q.fetch_one(&self.pool).await?;
        Ok(total.max(0) as u64)
    }

    async fn find(
        &self,
        filter: &LeaveFilter,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let (where_sql, args) = where_clause(filter);
        let data_sql = format!(
            r#"
            SELECT {}
            FROM leave_requests
            {}
            ORDER BY id ASC
            LIMIT ? OFFSET ?
            "#,
            LEAVE_COLUMNS, where_sql
        );

        let mut data_q = sqlx::query_as::<_, LeaveRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::U8(v) => data_q.bind(v),
            };
        }

        let rows = data_q.bind(limit).bind(skip).fetch_all(&self.pool).await?;
        self.hydrate(rows).await
    }

    async fn next_daily_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO leave_apply_counters (day, seq)
            VALUES (?, 1)
            ON DUPLICATE KEY UPDATE seq = seq + 1
            "#,
        )
        .bind(day)
        .execute(&mut *tx)
        .await?;

        let seq = sqlx::query_scalar::<_, u64>("SELECT seq FROM leave_apply_counters WHERE day = ?")
            .bind(day)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(seq)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM leave_requests WHERE created_at >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.max(0) as u64)
    }
}

async fn insert_audit_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    leave_id: u64,
    seq: u32,
    entry: &AuditEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO leave_audit_logs
            (leave_id, seq, actor_id, actor_name, action, description, remark, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(leave_id)
    .bind(seq)
    .bind(entry.actor.user_id)
    .bind(&entry.actor.user_name)
    .bind(entry.action.as_ref())
    .bind(&entry.description)
    .bind(&entry.remark)
    .bind(entry.at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
