use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use pin_project_lite::pin_project;

pin_project! {
    /// Future that resolves with its inner future, or never when there is none.
    ///
    /// Used for `tokio::select!` branches that only exist under some configuration, such as a
    /// disabled watchdog.
    #[derive(Debug)]
    pub struct OptionalFuture<F> {
        #[pin]
        inner: Option<F>,
    }
}

impl<F> OptionalFuture<F> {
    /// Wraps an optional future.
    pub const fn new(inner: Option<F>) -> Self {
        Self { inner }
    }
}

impl<F> Future for OptionalFuture<F>
where
    F: Future,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().inner.as_pin_mut() {
            Some(inner) => inner.poll(cx),
            None => Poll::Pending,
        }
    }
}

/// Helper for constructing an [`OptionalFuture`] without naming the type.
#[inline]
pub fn optional_future<F>(inner: Option<F>) -> OptionalFuture<F> {
    OptionalFuture::new(inner)
}
