use axum::body::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::artifacts::ArtifactLease;

/// File body that keeps its artifact leased until the stream is dropped,
/// whether it finished, errored, or the client went away mid-transfer.
pub struct LeasedStream {
    inner: ReaderStream<File>,
    _lease: ArtifactLease,
}

impl LeasedStream {
    pub fn new(file: File, lease: ArtifactLease) -> Self {
        Self {
            inner: ReaderStream::new(file),
            _lease: lease,
        }
    }
}

impl Stream for LeasedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
