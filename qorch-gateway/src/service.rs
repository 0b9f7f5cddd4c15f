//! The duck-typed service surface every Gateway-registered capability
//! provider implements. The Gateway treats `execute` as opaque
//! `(method, params) -> value`; method names and their parameter schemas
//! are service-defined and documented separately from this trait.

use async_trait::async_trait;
use qorch_core::Result;
use serde_json::Value;

#[async_trait]
pub trait Service: Send + Sync {
    fn service_id(&self) -> &str;

    fn capabilities(&self) -> &[String];

    async fn initialize(&self) -> Result<()>;

    async fn execute(&self, method: &str, params: Value) -> Result<Value>;

    async fn health_check(&self) -> bool;

    async fn shutdown(&self) -> Result<()>;
}
