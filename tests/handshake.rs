#![allow(clippy::unwrap_used)]

use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use async_std::net::TcpStream;
use futures::io::BufReader;
use rstest::rstest;

use ssh_trans::{
    algorithm::{Category, KnownKeys, TrustOnFirstUse},
    error::{FramingError, KexError},
    side::{client::Client, server::Server},
    wire::trans::{DisconnectReason, Ignore, ServiceAccept, ServiceRequest},
    Error, Session, State,
};

mod common;
use common::Data;

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[rstest]
#[case("aes128-ctr", "hmac-sha1", "curve25519-sha256", "none")]
#[case("aes192-ctr", "hmac-sha2-256", "curve25519-sha256@libssh.org", "none")]
#[case("aes256-ctr", "hmac-sha2-512", "diffie-hellman-group14-sha256", "none")]
#[case("aes128-cbc", "hmac-sha1-96", "diffie-hellman-group14-sha1", "none")]
#[case("aes192-cbc", "hmac-md5", "diffie-hellman-group1-sha1", "none")]
#[case("aes256-cbc", "hmac-md5-96", "curve25519-sha256", "zlib")]
#[case("3des-cbc", "hmac-sha2-256", "curve25519-sha256", "zlib")]
#[async_std::test]
async fn end_to_end(
    #[case] cipher: &str,
    #[case] mac: &str,
    #[case] kex: &str,
    #[case] compress: &str,
) -> TestResult {
    common::init();

    let (addr, handle) = common::server(common::keyed()).await?;

    tracing::info!("cipher::{cipher}, mac::{mac}, kex::{kex}, compress::{compress}, bound to {addr}");

    let mut client = common::connect(
        addr,
        Client {
            algorithms: common::catalog(&[
                (Category::KeyExchange, &[kex]),
                (Category::EncryptC2S, &[cipher]),
                (Category::EncryptS2C, &[cipher]),
                (Category::MacC2S, &[mac]),
                (Category::MacS2C, &[mac]),
                (Category::CompressC2S, &[compress]),
                (Category::CompressS2C, &[compress]),
            ]),
            ..Default::default()
        },
    )
    .await?;

    assert_eq!(client.state(), State::Established);
    assert!(client.session_id().is_some());

    client
        .send(&ServiceRequest {
            service_name: "ssh-userauth".into(),
        })
        .await?;
    let ServiceAccept { service_name } = client.recv().await?.to::<ServiceAccept>()?;
    assert_eq!(&*service_name, b"ssh-userauth");

    let data = Data {
        data: vec![0x42; 4096].into(),
    };
    client.send(&data).await?;
    assert_eq!(client.recv().await?.to::<Data>()?, data);

    client
        .disconnect(DisconnectReason::ByApplication, "done")
        .await?;
    assert_eq!(client.state(), State::Closed);

    let error = handle.await;
    tracing::info!("server ended with: {error:?}");

    assert!(matches!(
        error,
        Error::PeerDisconnected {
            reason: DisconnectReason::ByApplication,
            ..
        }
    ));

    Ok(())
}

#[async_std::test]
async fn rekey_keeps_the_session_id() -> TestResult {
    common::init();

    let (addr, handle) = common::server(common::keyed()).await?;
    let mut client = common::connect(addr, Default::default()).await?;

    let session_id = client.session_id().unwrap().to_vec();

    for round in 0u8..3 {
        client.rekey().await?;
        assert_eq!(client.state(), State::Established);
        assert_eq!(client.session_id(), Some(&*session_id));

        let data = Data {
            data: vec![round; 64].into(),
        };
        client.send(&data).await?;
        assert_eq!(client.recv().await?.to::<Data>()?, data);
    }

    client
        .disconnect(DisconnectReason::ByApplication, "done")
        .await?;
    assert!(matches!(handle.await, Error::PeerDisconnected { .. }));

    Ok(())
}

#[rstest]
#[case(&["curve25519-sha256", "diffie-hellman-group14-sha1"])]
#[case(&["diffie-hellman-group14-sha1", "curve25519-sha256"])]
#[async_std::test]
async fn guessed_packets(#[case] kexs: &[&str]) -> TestResult {
    common::init();

    let (addr, handle) = common::server(ssh_trans::side::server::Server {
        algorithms: common::catalog(&[(
            Category::KeyExchange,
            &["curve25519-sha256", "diffie-hellman-group14-sha1"],
        )]),
        ..common::keyed()
    })
    .await?;

    let mut client = common::connect(
        addr,
        Client {
            algorithms: common::catalog(&[(Category::KeyExchange, kexs)]),
            guess: true,
            ..Default::default()
        },
    )
    .await?;

    let data = Data {
        data: b"guess".to_vec().into(),
    };
    client.send(&data).await?;
    assert_eq!(client.recv().await?.to::<Data>()?, data);

    client
        .disconnect(DisconnectReason::ByApplication, "done")
        .await?;
    assert!(matches!(handle.await, Error::PeerDisconnected { .. }));

    Ok(())
}

#[async_std::test]
async fn unknown_transport_messages_are_not_fatal() -> TestResult {
    common::init();

    let (addr, handle) = common::server(common::keyed()).await?;
    let mut client = common::connect(addr, Default::default()).await?;

    client.send(&common::Unknown).await?;

    let data = Data {
        data: b"still there".to_vec().into(),
    };
    client.send(&data).await?;
    assert_eq!(client.recv().await?.to::<Data>()?, data);
    assert_eq!(client.state(), State::Established);

    client
        .disconnect(DisconnectReason::ByApplication, "done")
        .await?;
    assert!(matches!(handle.await, Error::PeerDisconnected { .. }));

    Ok(())
}

#[async_std::test]
async fn trust_on_first_use_remembers_the_key() -> TestResult {
    common::init();

    let server = common::keyed();
    let public = server.keys[0].public_key().clone();

    let verifier = Arc::new(TrustOnFirstUse::default());

    let (addr, _handle) = common::server(server).await?;
    let client = common::connect(
        addr,
        Client {
            verifier: verifier.clone(),
            ..Default::default()
        },
    )
    .await?;

    assert_eq!(client.state(), State::Established);
    assert_eq!(
        verifier.trusted().map(|key| key.key_data()),
        Some(public.key_data())
    );

    Ok(())
}

#[async_std::test]
async fn unknown_host_keys_are_rejected() -> TestResult {
    common::init();

    let (addr, handle) = common::server(common::keyed()).await?;
    let result = common::connect(
        addr,
        Client {
            verifier: Arc::new(KnownKeys(vec![common::key().public_key().clone()])),
            ..Default::default()
        },
    )
    .await;

    let Err(error) = result else {
        panic!("the handshake should have failed");
    };
    assert!(matches!(error, Error::Kex(KexError::HostKeyRejected)));
    assert_eq!(error.reason(), Some(DisconnectReason::HostKeyNotVerifiable));

    assert!(matches!(
        handle.await,
        Error::PeerDisconnected {
            reason: DisconnectReason::HostKeyNotVerifiable,
            ..
        }
    ));

    Ok(())
}

#[async_std::test]
async fn rekey_with_data_in_flight() -> TestResult {
    common::init();

    let (addr, handle) = common::server(common::keyed()).await?;
    let mut client = common::connect(addr, Default::default()).await?;

    let data = Data {
        data: b"in flight".to_vec().into(),
    };
    client.send(&data).await?;
    client.send(&Ignore::default()).await?;

    // Let the echo reach us before our `SSH_MSG_KEXINIT` reaches the server.
    async_std::task::sleep(Duration::from_millis(200)).await;

    client.rekey().await?;
    assert_eq!(client.state(), State::Established);

    assert_eq!(client.recv().await?.to::<Data>()?, data);

    let data = Data {
        data: b"after".to_vec().into(),
    };
    client.send(&data).await?;
    assert_eq!(client.recv().await?.to::<Data>()?, data);

    client
        .disconnect(DisconnectReason::ByApplication, "done")
        .await?;
    assert!(matches!(handle.await, Error::PeerDisconnected { .. }));

    Ok(())
}

#[rstest]
#[case("rsa-sha2-256")]
#[case("rsa-sha2-512")]
#[async_std::test]
async fn rsa_host_keys_sign_with_the_negotiated_hash(#[case] algorithm: &str) -> TestResult {
    common::init();

    let (addr, handle) = common::server(Server {
        keys: vec![common::rsa()],
        ..Default::default()
    })
    .await?;

    let mut client = common::connect(
        addr,
        Client {
            algorithms: common::catalog(&[(Category::ServerHostKey, &[algorithm])]),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(client.state(), State::Established);

    let data = Data {
        data: algorithm.as_bytes().to_vec().into(),
    };
    client.send(&data).await?;
    assert_eq!(client.recv().await?.to::<Data>()?, data);

    client
        .disconnect(DisconnectReason::ByApplication, "done")
        .await?;
    assert!(matches!(handle.await, Error::PeerDisconnected { .. }));

    Ok(())
}

#[rstest]
#[case::while_established(false)]
#[case::while_rekeying(true)]
#[async_std::test]
async fn corrupted_packets_are_fatal(#[case] rekey: bool) -> TestResult {
    common::init();

    let (addr, handle) = common::server(common::keyed()).await?;

    let (stream, tamper) = common::Tamper::new(TcpStream::connect(addr).await?);
    let mut client = Session::new(BufReader::new(stream), Client::default()).await?;
    assert_eq!(client.state(), State::Established);

    // Past the first cipher block, so that the length is left intact.
    tamper.store(20, Ordering::SeqCst);

    let result = if rekey {
        client.rekey().await
    } else {
        client
            .send(&Data {
                data: b"corrupted".to_vec().into(),
            })
            .await?;

        client.recv().await.map(drop)
    };

    assert!(matches!(
        result,
        Err(Error::Framing(FramingError::MacMismatch))
    ));
    assert_eq!(client.state(), State::Errored);
    assert!(matches!(client.recv().await, Err(Error::Disconnected)));

    assert!(matches!(
        handle.await,
        Error::PeerDisconnected {
            reason: DisconnectReason::MacError,
            ..
        }
    ));

    Ok(())
}
