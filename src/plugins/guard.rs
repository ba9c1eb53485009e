//! Fault containment around plugin hooks
//!
//! Every call into plugin code goes through one of these helpers so that a
//! panic becomes an ordinary error carrying the panic message.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// Extract a human-readable message from a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        return (*msg).to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}

/// Run a synchronous hook, folding panics and errors into one message
pub(crate) fn guard_sync<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, String> {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload))),
    }
}

/// Await an asynchronous hook, folding panics and errors into one message
pub(crate) async fn guard_async<T, F>(fut: F) -> Result<T, String>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_panic_is_contained() {
        let result: Result<(), String> = guard_sync(|| panic!("boom"));
        assert_eq!(result.unwrap_err(), "panicked: boom");

        let result = guard_sync(|| Ok(7));
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn async_error_and_panic_are_contained() {
        let err = guard_async(async { Err::<(), _>(anyhow::anyhow!("bad input")) })
            .await
            .unwrap_err();
        assert_eq!(err, "bad input");

        let err = guard_async(async {
            if true {
                panic!("{}", String::from("owned"));
            }
            Ok(())
        })
        .await
        .unwrap_err();
        assert_eq!(err, "panicked: owned");
    }
}
