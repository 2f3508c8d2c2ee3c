use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::loan::{
    ApproveLoanRequest, DisburseLoanRequest, DocumentUpload, InvestRequest, InvestmentOutcome,
    Loan, LoanFunding, LoanService, LoanState,
};
use crate::middleware::{ActorId, IDEMPOTENCY_KEY_HEADER};
use crate::models::{ApiResponse, CreateLoanBody, InvestBody, LoanStateQuery};

pub async fn create_loan(
    State(service): State<Arc<LoanService>>,
    payload: Result<Json<CreateLoanBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Loan>>)> {
    let Json(body) = payload?;
    body.validate()?;

    let loan = service.create_loan(body.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(loan))))
}

pub async fn list_loans(
    State(service): State<Arc<LoanService>>,
    Query(query): Query<LoanStateQuery>,
) -> ApiResult<Json<ApiResponse<Vec<Loan>>>> {
    let state = query
        .state
        .ok_or_else(|| ApiError::BadRequest("state query parameter is required".to_string()))?
        .parse::<LoanState>()
        .map_err(ApiError::BadRequest)?;

    let loans = service.get_loans_by_state(state).await?;
    Ok(Json(ApiResponse::ok(loans)))
}

pub async fn get_loan(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = service.get_loan(id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn get_loan_investments(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<LoanFunding>>> {
    let funding = service.get_loan_investments(id).await?;
    Ok(Json(ApiResponse::ok(funding)))
}

/// Multipart form: `approval_date`, `idempotency_key`, file `picture_proof`
pub async fn approve_loan(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
    ActorId(employee_id): ActorId,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let mut form = DocumentForm::read(multipart, "picture_proof").await?;

    let request = ApproveLoanRequest {
        loan_id: id,
        employee_id,
        approval_date: parse_date(form.required("approval_date")?, "approval_date")?,
        idempotency_key: idempotency_key(form.take("idempotency_key"), &headers),
        picture_proof: form.into_document()?,
    };

    let loan = service.approve_loan(request).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

pub async fn invest(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
    ActorId(investor_id): ActorId,
    headers: HeaderMap,
    payload: Result<Json<InvestBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InvestmentOutcome>>)> {
    let Json(body) = payload?;
    body.validate()?;

    let outcome = service
        .invest(InvestRequest {
            loan_id: id,
            investor_id,
            amount: body.amount,
            idempotency_key: idempotency_key(body.idempotency_key, &headers),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// Multipart form: `disbursement_date`, `idempotency_key`, file `signed_agreement`
pub async fn disburse_loan(
    State(service): State<Arc<LoanService>>,
    Path(id): Path<Uuid>,
    ActorId(employee_id): ActorId,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let mut form = DocumentForm::read(multipart, "signed_agreement").await?;

    let request = DisburseLoanRequest {
        loan_id: id,
        employee_id,
        disbursement_date: parse_date(form.required("disbursement_date")?, "disbursement_date")?,
        idempotency_key: idempotency_key(form.take("idempotency_key"), &headers),
        signed_agreement: form.into_document()?,
    };

    let loan = service.disburse_loan(request).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// Text fields plus one uploaded file
struct DocumentForm {
    file_field: &'static str,
    fields: HashMap<String, String>,
    document: Option<DocumentUpload>,
}

impl DocumentForm {
    async fn read(mut multipart: Multipart, file_field: &'static str) -> ApiResult<Self> {
        let mut fields = HashMap::new();
        let mut document = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == file_field {
                let filename = field.file_name().unwrap_or(file_field).to_string();
                let content = field.bytes().await?.to_vec();
                document = Some(DocumentUpload { filename, content });
            } else {
                let value = field.text().await?;
                fields.insert(name, value);
            }
        }

        Ok(Self {
            file_field,
            fields,
            document,
        })
    }

    fn take(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    fn required(&mut self, name: &str) -> ApiResult<String> {
        self.take(name)
            .ok_or_else(|| ApiError::ValidationError(format!("{} is required", name)))
    }

    fn into_document(self) -> ApiResult<DocumentUpload> {
        match self.document {
            Some(document) if !document.content.is_empty() => Ok(document),
            _ => Err(ApiError::ValidationError(format!(
                "{} file is required",
                self.file_field
            ))),
        }
    }
}

fn parse_date(value: String, field: &str) -> ApiResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|date| date.with_timezone(&Utc))
        .map_err(|_| {
            ApiError::ValidationError(format!(
                "{} must be an RFC3339 timestamp, got '{}'",
                field, value
            ))
        })
}

/// Body value first, then the `Idempotency-Key` header. An empty result is
/// rejected by the workflow.
fn idempotency_key(from_body: Option<String>, headers: &HeaderMap) -> String {
    from_body
        .or_else(|| {
            headers
                .get(IDEMPOTENCY_KEY_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-06-01T10:30:00+02:00".to_string(), "approval_date").unwrap();
        assert_eq!(date.to_rfc3339(), "2024-06-01T08:30:00+00:00");

        let err = parse_date("01/06/2024".to_string(), "approval_date").unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(ref m) if m.contains("approval_date")));
    }

    #[test]
    fn test_idempotency_key_prefers_body() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("from-header"));

        assert_eq!(
            idempotency_key(Some("from-body".to_string()), &headers),
            "from-body"
        );
        assert_eq!(idempotency_key(None, &headers), "from-header");
        assert_eq!(idempotency_key(None, &HeaderMap::new()), "");
    }
}
