//! Converts panics raised inside codec collaborators into errors.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use zdepth_core::error::{CodecError, Result};

/// Run `f`, turning a panic into [`CodecError::PanicRecovered`].
///
/// State touched by `f` may be half-updated after a panic; callers only pass
/// closures whose side effects are confined to the collaborator being called.
pub(crate) fn guarded<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(CodecError::PanicRecovered {
            stage,
            message: panic_message(payload.as_ref()),
        })
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
