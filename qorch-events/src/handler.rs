use async_trait::async_trait;
use qorch_core::model::Event;
use qorch_core::Result;

/// A subscriber to the event bus, either registered against one event type
/// or as a wildcard receiving every event. A handler may itself produce
/// response events (e.g. a logging handler emits nothing; a correlation
/// handler might emit a derived `info` event).
#[async_trait]
pub trait Handler: Send + Sync {
    /// A stable identifier used in error reporting (`handler_identifier`)
    /// and in registration-order bookkeeping.
    fn name(&self) -> &str;

    async fn handle(&self, event: &Event) -> Result<Vec<Event>>;
}

/// Adapts a plain closure into a `Handler`, for the common case of a
/// stateless subscriber (mirrors the teacher's `FnHook` convenience).
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&Event) -> Result<Vec<Event>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &Event) -> Result<Vec<Event>> {
        (self.f)(event)
    }
}

/// Transforms or suppresses an event before it reaches handlers. Middleware
/// runs in registration order; returning `None` suppresses the event for
/// every handler and for the history ring buffer.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, event: Event) -> Option<Event>;
}
