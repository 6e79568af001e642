//! Randomized datastream contents.

use std::pin::Pin;
use std::{io, task};

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::ReaderStream;

/// Random binary contents of a datastream, generated lazily while it is uploaded.
#[derive(Debug)]
pub struct Payload {
    /// The number of bytes left to produce.
    remaining: u64,
    rng: SmallRng,
}

impl Payload {
    /// Creates a payload of `len` random bytes.
    pub fn new(len: u64) -> Self {
        Self {
            remaining: len,
            rng: SmallRng::seed_from_u64(rand::random()),
        }
    }

    /// Wraps the payload into a streaming request body.
    pub fn into_body(self) -> reqwest::Body {
        reqwest::Body::wrap_stream(ReaderStream::new(self))
    }
}

impl AsyncRead for Payload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        let len = (buf.remaining() as u64).min(self.remaining) as usize;

        let chunk = buf.initialize_unfilled_to(len);
        self.rng.fill_bytes(chunk);

        self.remaining -= len as u64;
        buf.advance(len);

        task::Poll::Ready(Ok(()))
    }
}
