//! Cancelable future wrapper.
//!
//! `cancelable(fut)` returns the wrapped future plus a [`CancelToken`]. The
//! wrapper completes with exactly the inner future's output unless the token
//! was canceled first, in which case the wrapper never completes — the inner
//! future is still polled to completion, but its output is dropped rather
//! than surfaced. Cancellation is a one-way idempotent latch; there is no
//! un-cancel.
//!
//! A canceled wrapper stays `Pending` forever, so callers that drive it on a
//! spawned task should also abort the task when they move on.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

/// Shared one-way cancellation latch.
#[derive(Debug, Clone)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Trip the latch. Idempotent.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Future adapter returned by [`cancelable`].
pub struct Cancelable<F> {
    inner: F,
    canceled: Arc<AtomicBool>,
    done: bool,
}

/// Wrap `inner` so its output can be suppressed after cancellation.
pub fn cancelable<F: Future>(inner: F) -> (Cancelable<F>, CancelToken) {
    let canceled = Arc::new(AtomicBool::new(false));
    let token = CancelToken {
        canceled: Arc::clone(&canceled),
    };
    (
        Cancelable {
            inner,
            canceled,
            done: false,
        },
        token,
    )
}

impl<F: Future + Unpin> Future for Cancelable<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.canceled.load(Ordering::SeqCst) {
            // Keep driving the inner future so it still runs to completion,
            // but drop its output instead of surfacing it.
            if !this.done {
                if let Poll::Ready(_) = Pin::new(&mut this.inner).poll(cx) {
                    this.done = true;
                }
            }
            return Poll::Pending;
        }

        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(value) => {
                this.done = true;
                // Re-check: cancel may have raced in from another thread
                // while the inner future was being polled.
                if this.canceled.load(Ordering::SeqCst) {
                    Poll::Pending
                } else {
                    Poll::Ready(value)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
