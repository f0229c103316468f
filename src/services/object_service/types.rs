use crate::models::DurableObject;
use axum::http::StatusCode;

/// Synchronous result of a write: `201` when a durable write was scheduled,
/// `200` when identical content was already stored under the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObjectOutcome {
    pub status: StatusCode,
    pub object: DurableObject,
}

impl PutObjectOutcome {
    pub fn created(object: DurableObject) -> Self {
        Self {
            status: StatusCode::CREATED,
            object,
        }
    }

    pub fn unchanged(object: DurableObject) -> Self {
        Self {
            status: StatusCode::OK,
            object,
        }
    }

    pub fn is_created(&self) -> bool {
        self.status == StatusCode::CREATED
    }
}
