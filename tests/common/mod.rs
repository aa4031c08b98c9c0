#![allow(dead_code)]

use std::{
    convert::Infallible,
    io,
    net::SocketAddr,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use async_std::{
    net::{TcpListener, TcpStream},
    stream::StreamExt,
    task::JoinHandle,
};
use binrw::binrw;
use futures::{
    io::{AsyncRead, AsyncWrite, BufReader},
    ready,
};
use ssh_key::{private::RsaKeypair, Algorithm, PrivateKey};

use ssh_trans::{
    algorithm::{Catalog, Category},
    side::{client::Client, server::Server},
    wire::{
        arch::Bytes,
        trans::{ServiceAccept, ServiceRequest},
        Message,
    },
    Error, Result, Session,
};

/// An upper-layer message, echoed back by the test server.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 94_u8)]
pub struct Data {
    pub data: Bytes,
}

impl Message for Data {
    const CODE: u8 = 94;
}

/// A message in the transport range no implementation knows about.
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
#[brw(big, magic = 40_u8)]
pub struct Unknown;

impl Message for Unknown {
    const CODE: u8 = 40;
}

pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

pub fn key() -> PrivateKey {
    PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519).unwrap()
}

pub fn rsa() -> PrivateKey {
    RsaKeypair::random(&mut rand::thread_rng(), 2048)
        .unwrap()
        .into()
}

pub fn catalog(overrides: &[(Category, &[&str])]) -> Arc<Catalog> {
    let catalog = overrides
        .iter()
        .try_fold(Catalog::default(), |catalog, (category, names)| {
            catalog.with(*category, names.iter())
        })
        .unwrap();

    Arc::new(catalog)
}

pub async fn connect(
    addr: SocketAddr,
    client: Client,
) -> Result<Session<BufReader<TcpStream>, Client>> {
    Session::new(BufReader::new(TcpStream::connect(addr).await?), client).await
}

/// Spawn a server accepting a single session, which answers service requests
/// and echoes [`Data`] until it fails, returning the error that ended it.
pub async fn server(config: Server) -> Result<(SocketAddr, JoinHandle<Error>)> {
    let socket = TcpListener::bind(("127.0.0.1", 0)).await?;
    let addr = socket.local_addr()?;

    let handle = async_std::task::spawn_local(async move {
        match serve(socket, config).await {
            Ok(never) => match never {},
            Err(err) => err,
        }
    });

    Ok((addr, handle))
}

async fn serve(socket: TcpListener, config: Server) -> Result<Infallible> {
    let stream = socket.incoming().next().await.unwrap()?;
    let mut session = Session::new(BufReader::new(stream), config).await?;

    loop {
        let packet = session.recv().await?;

        if let Ok(ServiceRequest { service_name }) = packet.to::<ServiceRequest>() {
            session.send(&ServiceAccept { service_name }).await?;
        } else if let Ok(data) = packet.to::<Data>() {
            session.send(&data).await?;
        } else {
            session.unimplemented().await?;
        }
    }
}

pub fn keyed() -> Server {
    Server {
        keys: vec![key()],
        ..Default::default()
    }
}

/// A stream flipping one bit of the incoming data once armed,
/// at an offset counted from the moment it was armed.
pub struct Tamper<S> {
    inner: S,
    at: Arc<AtomicUsize>,
}

impl<S> Tamper<S> {
    const DISARMED: usize = usize::MAX;

    pub fn new(inner: S) -> (Self, Arc<AtomicUsize>) {
        let at = Arc::new(AtomicUsize::new(Self::DISARMED));

        (
            Self {
                inner,
                at: at.clone(),
            },
            at,
        )
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Tamper<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        let size = ready!(Pin::new(&mut self.inner).poll_read(cx, buf))?;

        let at = self.at.load(Ordering::SeqCst);
        if at != Self::DISARMED {
            if at < size {
                buf[at] ^= 0x01;
                self.at.store(Self::DISARMED, Ordering::SeqCst);
            } else {
                self.at.store(at - size, Ordering::SeqCst);
            }
        }

        Poll::Ready(Ok(size))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Tamper<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_close(cx)
    }
}
