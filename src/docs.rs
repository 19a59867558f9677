use crate::api::leave_request::{
    LeaveListResponse, LeaveResponse, PendingCountResponse, RemarkPayload,
};
use crate::model::leave_request::{
    Actor, Applicant, Approver, AuditAction, AuditEntry, DateRange, LeaveStatus, LeaveType,
};
use crate::workflow::{LeaveForm, LeaveQuery, QueryRole};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Leave Approval API",
        version = "1.0.0",
        description = r#"
## Multi-level leave approval

Employees submit leave requests that walk through one approver per department
the employee belongs to. Each approver either hands the request to the next
approver, gives final approval, or rejects it with a remark. The applicant may
cancel while the request is still open.

### 🔐 Security
Every endpoint requires a **JWT Bearer** access token.

### 📦 Response Format
Every response is wrapped as `{ success, code, message, data }`; failures carry
`VALIDATION_ERROR`, `NOT_FOUND`, `AUTHORIZATION_ERROR`, `STATE_CONFLICT`,
`DEPENDENCY_ERROR` or `AUTHENTICATION_ERROR` in `code`.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::leave_request::create_leave,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::pending_count,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::cancel_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave
    ),
    components(
        schemas(
            LeaveForm,
            LeaveQuery,
            QueryRole,
            RemarkPayload,
            LeaveResponse,
            LeaveListResponse,
            PendingCountResponse,
            LeaveType,
            LeaveStatus,
            DateRange,
            Approver,
            Applicant,
            Actor,
            AuditAction,
            AuditEntry
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Leave", description = "Leave request submission and approval"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
