// trace/scope.rs - Ambient Span Scope

//! Thread-local ambient span tracking.
//!
//! The span "in scope" on a thread is the implicit parent for synchronously
//! nested work (a tool call made while inside an LLM-call span). Entering a
//! scope returns an RAII guard; the scope is released when the guard drops,
//! on every exit path. Entries are shared cells: a guard dropped on another
//! thread (a run force-closed elsewhere, or an end event delivered on a
//! different worker) marks its entry closed, and the owning thread prunes
//! closed entries whenever it reads or pushes the stack. A released span is
//! therefore never handed out as an ambient parent again, regardless of
//! which thread released it.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use super::span::SpanContext;

#[derive(Debug)]
struct ScopeEntry {
    context: SpanContext,
    closed: AtomicBool,
}

thread_local! {
    static ACTIVE: RefCell<Vec<Arc<ScopeEntry>>> = const { RefCell::new(Vec::new()) };
}

fn prune(stack: &mut Vec<Arc<ScopeEntry>>) {
    stack.retain(|e| !e.closed.load(Ordering::Acquire));
}

/// The span currently in scope on this thread, if any.
pub fn current() -> Option<SpanContext> {
    ACTIVE.with(|stack| {
        let mut stack = stack.borrow_mut();
        prune(&mut stack);
        stack.last().map(|e| e.context)
    })
}

/// Enter a span's scope on the calling thread.
///
/// The returned guard must be held for as long as the span should stay in
/// scope; dropping it releases the scope.
#[must_use = "dropping the guard immediately exits the scope"]
pub fn enter(context: SpanContext) -> ScopeGuard {
    let entry = Arc::new(ScopeEntry {
        context,
        closed: AtomicBool::new(false),
    });
    ACTIVE.with(|stack| {
        let mut stack = stack.borrow_mut();
        prune(&mut stack);
        stack.push(entry.clone());
    });
    ScopeGuard {
        entry,
        owner: thread::current().id(),
    }
}

/// RAII marker for an entered span scope.
#[derive(Debug)]
pub struct ScopeGuard {
    entry: Arc<ScopeEntry>,
    owner: ThreadId,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.entry.closed.store(true, Ordering::Release);
        // Only the owner may touch its thread-local stack; other threads
        // leave the tombstone for the owner to prune.
        if thread::current().id() == self.owner {
            ACTIVE.with(|stack| prune(&mut stack.borrow_mut()));
        }
    }
}
