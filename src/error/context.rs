//! Ambient error context
//!
//! Per-thread "last error" slot plus a stack of diagnostic frames. Public
//! operations push a frame for their duration; when a failure is recorded the
//! current frame stack is captured with it.

use super::MetaError;
use crate::logging::{log_runtime_error, log_usage_error};
use std::cell::RefCell;
use tracing::span::EnteredSpan;

thread_local! {
    static CONTEXT: RefCell<ErrorContext> = RefCell::new(ErrorContext::default());
}

#[derive(Default)]
struct ErrorContext {
    last: Option<ErrorRecord>,
    frames: Vec<String>,
}

/// A recorded failure together with the frames active when it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub error: MetaError,
    pub frames: Vec<String>,
}

impl ErrorRecord {
    /// Innermost frame, if any
    pub fn origin(&self) -> Option<&str> {
        self.frames.last().map(String::as_str)
    }
}

/// Store `err` as the thread's last error and log it
pub fn record(err: MetaError) -> MetaError {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        let frames = ctx.frames.clone();
        let origin = frames.last().map(String::as_str).unwrap_or("<none>");

        if err.is_usage_error() {
            log_usage_error(&err.to_string(), origin);
        } else {
            log_runtime_error(&err.to_string(), origin);
        }

        ctx.last = Some(ErrorRecord {
            error: err.clone(),
            frames,
        });
    });
    err
}

/// Last error recorded on this thread
pub fn last_error() -> Option<ErrorRecord> {
    CONTEXT.with(|ctx| ctx.borrow().last.clone())
}

/// Take and clear the last error
pub fn take_last_error() -> Option<ErrorRecord> {
    CONTEXT.with(|ctx| ctx.borrow_mut().last.take())
}

/// Forget the last error
pub fn clear() {
    CONTEXT.with(|ctx| ctx.borrow_mut().last = None);
}

/// Snapshot of the active frame stack, outermost first
pub fn frames() -> Vec<String> {
    CONTEXT.with(|ctx| ctx.borrow().frames.clone())
}

pub fn depth() -> usize {
    CONTEXT.with(|ctx| ctx.borrow().frames.len())
}

/// Push a diagnostic frame for the lifetime of the returned guard
#[must_use]
pub fn frame(name: impl Into<String>) -> FrameGuard {
    let name = name.into();
    let span = tracing::debug_span!("frame", name = %name).entered();
    CONTEXT.with(|ctx| ctx.borrow_mut().frames.push(name));
    FrameGuard {
        depth: depth(),
        _span: span,
    }
}

/// Pops its frame on drop, including on early return or unwinding
pub struct FrameGuard {
    depth: usize,
    _span: EnteredSpan,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        CONTEXT.with(|ctx| {
            if let Ok(mut ctx) = ctx.try_borrow_mut() {
                ctx.frames.truncate(self.depth.saturating_sub(1));
            }
        });
    }
}
