use crate::{cursor::ByteCursor, varint::encode_varint, MspErr};
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream, UdpSocket,
    },
};
use tracing::trace;

/// Large enough for any UDP datagram.
const RECV_BUFFER_SIZE: usize = 65536;

/// Receiving side of a transport.
#[async_trait]
pub trait Inbound: Send {
    /// Receive whatever arrived next. `Ok(0)` means the peer is gone.
    async fn recv(&mut self, bufs: &mut [u8]) -> std::io::Result<usize>;
}

/// Sending side of a transport.
#[async_trait]
pub trait Outbound: Send {
    /// Send all of `bufs`. Datagram transports send exactly one datagram.
    async fn send(&mut self, bufs: &[u8]) -> std::io::Result<()>;

    async fn shutdown(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Inbound for R {
    async fn recv(&mut self, bufs: &mut [u8]) -> std::io::Result<usize> {
        self.read(bufs).await
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Outbound for W {
    async fn send(&mut self, bufs: &[u8]) -> std::io::Result<()> {
        self.write_all(bufs).await?;
        self.flush().await
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

/// UDP socket already connected to its single peer.
#[derive(Debug)]
pub struct Datagram(pub UdpSocket);

#[async_trait]
impl Inbound for Datagram {
    async fn recv(&mut self, bufs: &mut [u8]) -> std::io::Result<usize> {
        self.0.recv(bufs).await
    }
}

#[async_trait]
impl Outbound for Datagram {
    async fn send(&mut self, bufs: &[u8]) -> std::io::Result<()> {
        self.0.send(bufs).await.map(|_| ())
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Buffered reader/writer over a transport.
///
/// Typed reads wait until enough bytes arrived, writes only buffer until [StreamSocket::flush].
/// Dropping the socket releases the transport, so every exit path of a protocol call closes it.
pub struct StreamSocket<T> {
    transport: T,
    inbound: ByteCursor,
    outbound: ByteCursor,
    recv_buf: Vec<u8>,
    closed: bool,
}

macro_rules! delegate_reads {
    ($($name:ident -> $ty:ty;)*) => {
        $(
            pub async fn $name(&mut self) -> Result<$ty, MspErr> {
                self.read_with(|cursor| cursor.$name()).await
            }
        )*
    };
}

macro_rules! delegate_writes {
    ($($name:ident($ty:ty);)*) => {
        $(
            pub fn $name(&mut self, value: $ty) {
                self.outbound.$name(value)
            }
        )*
    };
}

impl<T> StreamSocket<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            inbound: ByteCursor::new(),
            outbound: ByteCursor::new(),
            recv_buf: vec![0u8; RECV_BUFFER_SIZE],
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes received but not read yet.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    delegate_writes! {
        write_u8(u8);
        write_i8(i8);
        write_u16_be(u16);
        write_u16_le(u16);
        write_i16_be(i16);
        write_i16_le(i16);
        write_u32_be(u32);
        write_u32_le(u32);
        write_i32_be(i32);
        write_i32_le(i32);
        write_u64_be(u64);
        write_u64_le(u64);
        write_i64_be(i64);
        write_i64_le(i64);
        write_f32_be(f32);
        write_f32_le(f32);
        write_f64_be(f64);
        write_f64_le(f64);
        write_varint(i32);
        write_bytes(&[u8]);
        write_string_bytes(&str);
        write_string_varint(&str);
        write_string_nt(&str);
        write_utf16_be(&str);
    }
}

impl<T: Inbound> StreamSocket<T> {
    /// Run `decode` against the received bytes, waiting for more data for as long as it
    /// reports [MspErr::BufferUnderflow]. A failed attempt consumes nothing.
    pub async fn read_with<V, F>(&mut self, mut decode: F) -> Result<V, MspErr>
    where
        F: FnMut(&mut ByteCursor) -> Result<V, MspErr> + Send,
        V: Send,
    {
        loop {
            let mark = self.inbound.position();

            match decode(&mut self.inbound) {
                Err(MspErr::BufferUnderflow { .. }) => {
                    self.inbound.set_position(mark);
                    self.fill().await?;
                }
                result => return result,
            }
        }
    }

    /// Wait until at least `size` unread bytes are buffered.
    pub async fn ensure_buffered(&mut self, size: usize) -> Result<(), MspErr> {
        while self.inbound.len() < size {
            self.fill().await?;
        }

        Ok(())
    }

    async fn fill(&mut self) -> Result<(), MspErr> {
        if self.closed {
            return Err(MspErr::ConnectionClosed);
        }

        let size = match self.transport.recv(&mut self.recv_buf).await {
            Ok(size) => size,
            Err(err) => {
                return Err(match err.kind() {
                    ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof => {
                        self.closed = true;

                        MspErr::ConnectionClosed
                    }
                    _ => MspErr::IoErr(err),
                });
            }
        };

        if size == 0 {
            self.closed = true;

            return Err(MspErr::ConnectionClosed);
        }

        trace!(size, buffered = self.inbound.len(), "received");
        self.inbound.extend_from_slice(&self.recv_buf[..size]);

        Ok(())
    }

    delegate_reads! {
        read_u8 -> u8;
        read_i8 -> i8;
        read_u16_be -> u16;
        read_u16_le -> u16;
        read_i16_be -> i16;
        read_i16_le -> i16;
        read_u32_be -> u32;
        read_u32_le -> u32;
        read_i32_be -> i32;
        read_i32_le -> i32;
        read_u64_be -> u64;
        read_u64_le -> u64;
        read_i64_be -> i64;
        read_i64_le -> i64;
        read_f32_be -> f32;
        read_f32_le -> f32;
        read_f64_be -> f64;
        read_f64_le -> f64;
        read_varint -> i32;
        read_string_varint -> String;
        read_string_nt -> String;
        read_string_nt_latin1 -> String;
    }

    pub async fn read_bytes(&mut self, size: usize) -> Result<Vec<u8>, MspErr> {
        self.read_with(|cursor| cursor.read_bytes(size)).await
    }

    pub async fn skip(&mut self, size: usize) -> Result<(), MspErr> {
        self.read_with(|cursor| cursor.skip(size)).await
    }

    pub async fn read_string(&mut self, size: usize) -> Result<String, MspErr> {
        self.read_with(|cursor| cursor.read_string(size)).await
    }

    pub async fn read_string_until(&mut self, terminator: u8) -> Result<String, MspErr> {
        self.read_with(|cursor| cursor.read_string_until(terminator))
            .await
    }

    pub async fn read_string_nt_followed_by(
        &mut self,
        suffixes: &[&[u8]],
    ) -> Result<String, MspErr> {
        self.read_with(|cursor| cursor.read_string_nt_followed_by(suffixes))
            .await
    }

    pub async fn read_utf16_be(&mut self, code_units: usize) -> Result<String, MspErr> {
        self.read_with(|cursor| cursor.read_utf16_be(code_units))
            .await
    }
}

impl<T: Outbound> StreamSocket<T> {
    /// Send everything written so far, optionally prefixed with its length as a VarInt.
    pub async fn flush(&mut self, prefix_length: bool) -> Result<(), MspErr> {
        if self.closed {
            return Err(MspErr::ConnectionClosed);
        }

        let mut bufs = self.outbound.take_all();

        if prefix_length {
            let mut framed = encode_varint(bufs.len() as i32);

            framed.append(&mut bufs);
            bufs = framed;
        }

        trace!(size = bufs.len(), "flushing");
        self.transport.send(&bufs).await?;

        Ok(())
    }

    /// Idempotent. Pending reads fail with [MspErr::ConnectionClosed] afterwards.
    pub async fn close(&mut self) {
        self.outbound.clear();

        if !self.closed {
            self.closed = true;

            // The peer may already be gone, nothing left to report.
            let _ = self.transport.shutdown().await;
        }
    }
}

impl StreamSocket<TcpStream> {
    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (StreamSocket<OwnedReadHalf>, StreamSocket<OwnedWriteHalf>) {
        let (read_half, write_half) = self.transport.into_split();

        (
            StreamSocket {
                transport: read_half,
                inbound: self.inbound,
                outbound: ByteCursor::new(),
                recv_buf: self.recv_buf,
                closed: self.closed,
            },
            StreamSocket {
                transport: write_half,
                inbound: ByteCursor::new(),
                outbound: self.outbound,
                recv_buf: Vec::new(),
                closed: self.closed,
            },
        )
    }
}
