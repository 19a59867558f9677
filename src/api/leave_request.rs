use crate::auth::auth::AuthUser;
use crate::error::WorkflowError;
use crate::model::leave_request::{
    Applicant, Approver, AuditEntry, DateRange, LeaveId, LeaveRequest, LeaveStatus, LeaveType,
};
use crate::utils::response::ApiResponse;
use crate::workflow::{LeaveForm, LeaveQueries, LeaveQuery, LeaveWorkflow};
use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct LeaveResponse {
    #[schema(example = 1)]
    /// leave application id
    pub id: LeaveId,
    #[schema(example = "XJ-202601051")]
    pub apply_number: String,
    #[schema(example = "annual")]
    pub leave_type: LeaveType,
    pub leave_dates: Vec<DateRange>,
    #[schema(example = 2.0)]
    pub leave_length: f64,
    #[schema(example = "family trip")]
    pub reason: String,
    pub applicant: Applicant,
    /// approvers in the order they act
    pub approval_chain: Vec<Approver>,
    #[schema(example = "in_review")]
    pub status: LeaveStatus,
    #[schema(example = 2)]
    /// numeric status, same codes as the `apply_state` filter
    pub status_code: u8,
    #[schema(example = 1)]
    /// index into `approval_chain`
    pub current_step: usize,
    /// only present while the request is open
    pub current_approver: Option<Approver>,
    pub audit_log: Vec<AuditEntry>,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(example = "2026-01-01T00:00:00Z", format = "date-time", value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<&LeaveRequest> for LeaveResponse {
    fn from(request: &LeaveRequest) -> Self {
        let status = request.status();
        Self {
            id: request.id,
            apply_number: request.apply_number.clone(),
            leave_type: request.leave_type,
            leave_dates: request.leave_dates.clone(),
            leave_length: request.leave_length,
            reason: request.reason.clone(),
            applicant: request.applicant.clone(),
            approval_chain: request.approval_chain.clone(),
            status,
            status_code: status.code(),
            current_step: request.current_step(),
            current_approver: if status.is_open() {
                request.current_approver().cloned()
            } else {
                None
            },
            audit_log: request.audit_log.clone(),
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveResponse>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub page_size: u64,
    #[schema(example = 1)]
    pub total: u64,
}

#[derive(Serialize, ToSchema)]
pub struct PendingCountResponse {
    #[schema(example = 3)]
    pub count: u64,
}

/// Optional body for cancel/approve and required body for reject.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RemarkPayload {
    #[schema(example = "enjoy your trip")]
    pub remark: Option<String>,
}

/// An empty body means no remark; anything else must parse as `RemarkPayload`.
fn remark_of(body: &[u8]) -> Result<Option<String>, WorkflowError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<RemarkPayload>(body)
        .map(|payload| payload.remark)
        .map_err(|e| WorkflowError::Validation(format!("invalid request body: {}", e)))
}

fn leave_ok(message: &str, request: &LeaveRequest) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(message, LeaveResponse::from(request)))
}

/* =========================
Submit leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(
        content = LeaveForm,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 200, description = "Leave request submitted", body = LeaveResponse),
        (status = 400, description = "Invalid form or no department approver"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Directory or record store unavailable")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    workflow: web::Data<LeaveWorkflow>,
    payload: web::Json<LeaveForm>,
) -> Result<HttpResponse, WorkflowError> {
    let request = workflow.submit(&auth, payload.into_inner()).await?;
    Ok(leave_ok("Leave request submitted", &request))
}

/* =========================
List leave requests
========================= */
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveQuery),
    responses(
        (status = 200, description = "Paginated leave list", body = LeaveListResponse),
        (status = 400, description = "Invalid filter or pagination"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "role=all requested by a non-admin")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    queries: web::Data<LeaveQueries>,
    query: web::Query<LeaveQuery>,
) -> Result<HttpResponse, WorkflowError> {
    let page = queries.list(&auth, &query).await?;
    let body = LeaveListResponse {
        data: page.items.iter().map(LeaveResponse::from).collect(),
        page: page.page,
        page_size: page.page_size,
        total: page.total,
    };
    Ok(HttpResponse::Ok().json(ApiResponse::ok("", body)))
}

#[utoipa::path(
    get,
    path = "/api/leave/pending-count",
    responses(
        (status = 200, description = "Open requests waiting on the caller", body = PendingCountResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn pending_count(
    auth: AuthUser,
    queries: web::Data<LeaveQueries>,
) -> Result<HttpResponse, WorkflowError> {
    let count = queries.pending_count(&auth).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("", PendingCountResponse { count })))
}

#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to fetch")
    ),
    responses(
        (status = 200, description = "Leave request found", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is neither applicant, approver nor admin"),
        (status = 404, description = "Leave request not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    workflow: web::Data<LeaveWorkflow>,
    path: web::Path<LeaveId>,
) -> Result<HttpResponse, WorkflowError> {
    let request = workflow.detail(&auth, path.into_inner()).await?;
    Ok(leave_ok("", &request))
}

#[utoipa::path(
    post,
    path = "/api/leave/{leave_id}/cancel",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to cancel")
    ),
    request_body(content = Option<RemarkPayload>, content_type = "application/json"),
    responses(
        (status = 200, description = "Leave request cancelled", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the applicant"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request already closed or changed concurrently")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn cancel_leave(
    auth: AuthUser,
    workflow: web::Data<LeaveWorkflow>,
    path: web::Path<LeaveId>,
    body: web::Bytes,
) -> Result<HttpResponse, WorkflowError> {
    let remark = remark_of(&body)?;
    let request = workflow.cancel(&auth, path.into_inner(), remark).await?;
    Ok(leave_ok("Leave request cancelled", &request))
}

/* =========================
Approve leave (current approver)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to approve")
    ),
    request_body(content = Option<RemarkPayload>, content_type = "application/json"),
    responses(
        (status = 200, description = "Step approved, or final approval given", body = LeaveResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the current approver"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request already closed or changed concurrently")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn approve_leave(
    auth: AuthUser,
    workflow: web::Data<LeaveWorkflow>,
    path: web::Path<LeaveId>,
    body: web::Bytes,
) -> Result<HttpResponse, WorkflowError> {
    let remark = remark_of(&body)?;
    let request = workflow.approve(&auth, path.into_inner(), remark).await?;
    let message = if request.status() == LeaveStatus::Approved {
        "Leave approved"
    } else {
        "Leave step approved"
    };
    Ok(leave_ok(message, &request))
}

/* =========================
Reject leave (current approver)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(
        ("leave_id" = u64, Path, description = "ID of the leave request to reject")
    ),
    request_body(content = RemarkPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveResponse),
        (status = 400, description = "Remark missing"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not the current approver"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request already closed or changed concurrently")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Leave"
)]
pub async fn reject_leave(
    auth: AuthUser,
    workflow: web::Data<LeaveWorkflow>,
    path: web::Path<LeaveId>,
    body: web::Bytes,
) -> Result<HttpResponse, WorkflowError> {
    let remark = remark_of(&body)?;
    let request = workflow.reject(&auth, path.into_inner(), remark).await?;
    Ok(leave_ok("Leave rejected", &request))
}
