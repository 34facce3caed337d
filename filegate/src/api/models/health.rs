use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `UP` while the process serves requests
    #[schema(example = "UP")]
    pub status: String,
}
