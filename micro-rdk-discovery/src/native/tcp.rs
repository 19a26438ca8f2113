use std::{
    mem::MaybeUninit,
    net::{SocketAddr, TcpStream},
    pin::Pin,
    task::{Context, Poll},
};

use async_io::Async;
use futures_lite::{ready, AsyncRead, AsyncWrite};
use hyper::rt;

/// Plain TCP stream usable by hyper connections.
pub struct NativeStream(Async<TcpStream>);

impl NativeStream {
    pub async fn connect(addr: SocketAddr) -> Result<Self, std::io::Error> {
        Ok(Self(Async::<TcpStream>::connect(addr).await?))
    }
}

impl From<Async<TcpStream>> for NativeStream {
    fn from(value: Async<TcpStream>) -> Self {
        Self(value)
    }
}

impl rt::Read for NativeStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        mut buf: rt::ReadBufCursor<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        let uninit = unsafe { buf.as_mut() };
        uninit.iter_mut().for_each(|b| {
            b.write(0);
        });
        // SAFETY: every byte was initialized above
        let init_buf = unsafe { &mut *(uninit as *mut [MaybeUninit<u8>] as *mut [u8]) };
        let s = &mut self.0;
        futures_lite::pin!(s);
        let n = ready!(s.poll_read(cx, init_buf))?;
        unsafe { buf.advance(n) };
        Poll::Ready(Ok(()))
    }
}

impl rt::Write for NativeStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, std::io::Error>> {
        let s = &mut self.0;
        futures_lite::pin!(s);
        s.poll_write(cx, buf)
    }
    fn poll_flush(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        let s = &mut self.0;
        futures_lite::pin!(s);
        s.poll_flush(cx)
    }
    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<(), std::io::Error>> {
        let s = &mut self.0;
        futures_lite::pin!(s);
        s.poll_close(cx)
    }
}
