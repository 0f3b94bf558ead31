// Panic isolation for handler calls
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Result of a panic-guarded execution
#[derive(Debug)]
pub enum PanicGuardResult<T> {
    /// Execution completed successfully
    Success(T),
    /// Execution panicked
    Panicked(String),
}

/// Drive a future to completion, catching a panic raised while polling it
///
/// One task's handler blowing up must not take the rest of its batch, or the
/// worker loop, down with it.
///
/// # Example
/// ```text
/// match execute_guarded(handler.handle(payload)).await {
///     PanicGuardResult::Panicked(msg) => warn!("handler panicked: {}", msg),
///     PanicGuardResult::Success(()) => {}
/// }
/// ```
pub async fn execute_guarded<F>(future: F) -> PanicGuardResult<F::Output>
where
    F: Future,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => PanicGuardResult::Success(result),
        Err(panic_info) => PanicGuardResult::Panicked(panic_message(panic_info.as_ref())),
    }
}

fn panic_message(panic_info: &(dyn Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_value_through() {
        let result = execute_guarded(async { 42 }).await;
        assert!(matches!(result, PanicGuardResult::Success(42)));
    }

    #[tokio::test]
    async fn test_panic_is_caught_with_message() {
        let result = execute_guarded(async {
            panic!("boom {}", 7);
        })
        .await;
        match result {
            PanicGuardResult::Panicked(msg) => assert_eq!(msg, "boom 7"),
            PanicGuardResult::Success(()) => panic!("expected panic to be caught"),
        }
    }

    #[tokio::test]
    async fn test_static_str_panic_message() {
        let result = execute_guarded(async {
            panic!("static");
        })
        .await;
        assert!(matches!(result, PanicGuardResult::Panicked(ref m) if m == "static"));
    }
}
