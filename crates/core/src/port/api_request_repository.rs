// API request idempotency repository (spec §3 "API request (thin)")

use crate::domain::ApiRequest;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ApiRequestRepository: Send + Sync {
    async fn find_by_request_id(&self, request_id: &str) -> Result<Option<ApiRequest>>;

    async fn insert_if_absent(&self, request: &ApiRequest) -> Result<bool>;
}
