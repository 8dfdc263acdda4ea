use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Outcome of a method handler: `Ok` becomes the reply's `data`, `Err` its
/// `err`. Both are arbitrary JSON, relayed to the caller as-is.
pub type HandlerResult = std::result::Result<Value, Value>;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased async handler taking the request's positional arguments.
///
/// Wrapped in Arc for cheap cloning into spawned tasks.
pub(super) type BoxedHandler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<HandlerResult> + Send + Sync>;

/// Erase a typed handler so handlers of different closure types can share
/// one registry.
pub(super) fn wrap_handler<F, Fut>(handler: F) -> BoxedHandler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    // ---
    Arc::new(move |args: Vec<Value>| Box::pin(handler(args)) as BoxFuture<HandlerResult>)
}
