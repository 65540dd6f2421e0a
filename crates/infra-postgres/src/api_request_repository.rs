// Postgres ApiRequestRepository implementation (spec §3 "API request
// (thin)", §4.1 request-id idempotency).

use async_trait::async_trait;
use geostage_core::domain::ApiRequest;
use geostage_core::error::{AppError, Result};
use geostage_core::port::ApiRequestRepository;
use sqlx::PgPool;

fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => AppError::Conflict(format!("unique constraint violated: {}", db_err.message())),
            Some(code) => AppError::Database(format!("database error [{code}]: {}", db_err.message())),
            None => AppError::Database(db_err.message().to_string()),
        },
        other => AppError::Database(other.to_string()),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ApiRequestRow {
    request_id: String,
    job_id: String,
    data_type: String,
    created_at: i64,
}

impl From<ApiRequestRow> for ApiRequest {
    fn from(row: ApiRequestRow) -> Self {
        ApiRequest {
            request_id: row.request_id,
            job_id: row.job_id,
            data_type: row.data_type,
            created_at: row.created_at,
        }
    }
}

pub struct PgApiRequestRepository {
    pool: PgPool,
}

impl PgApiRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiRequestRepository for PgApiRequestRepository {
    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ApiRequest>> {
        let row = sqlx::query_as::<_, ApiRequestRow>(
            "SELECT * FROM api_requests WHERE request_id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ApiRequest::from))
    }

    async fn insert_if_absent(&self, request: &ApiRequest) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO api_requests (request_id, job_id, data_type, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (request_id) DO NOTHING
            "#,
        )
        .bind(&request.request_id)
        .bind(&request.job_id)
        .bind(&request.data_type)
        .bind(request.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
