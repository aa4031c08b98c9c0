//! Server-[`Side`] implementation of the _session_.

use std::{str::FromStr, sync::Arc, time::Duration};

use futures_time::time::Duration as Timeout;

use super::{receive_then_send, KexInits, Side};
use crate::{
    algorithm::{
        guessed_right,
        kex::{Ephemeral, KexMeta},
        negotiate, Catalog, Category, Kex, Key, Negotiated,
    },
    error::KexError,
    id::Id,
    stream::{Stream, TransportPair},
    wire::{arch::NameList, trans::KexInit},
    Pipe, Result,
};

#[doc(no_inline)]
pub use ssh_key::PrivateKey;

/// A _server_-side session configuration.
#[derive(Debug, Clone)]
pub struct Server {
    /// [`Id`] for this _server_ session.
    pub id: Id,

    /// Timeout for sending and receiving packets.
    pub timeout: Duration,

    /// Server keys for key-exchange signature.
    pub keys: Vec<PrivateKey>,

    /// The algorithms enabled for this _server_ session,
    /// host key algorithms being restricted to the ones of the `keys`.
    pub algorithms: Arc<Catalog>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            id: Id::local("server"),
            timeout: Duration::from_secs(120),
            keys: Default::default(),
            algorithms: Default::default(),
        }
    }
}

impl Server {
    /// The host key able to sign for the `algorithm`, any RSA key serving all its flavors.
    fn key(&self, algorithm: &Key) -> Option<&PrivateKey> {
        self.keys
            .iter()
            .find(|key| match (algorithm, key.algorithm()) {
                (Key::Rsa { .. }, Key::Rsa { .. }) => true,
                (algorithm, owned) => *algorithm == owned,
            })
    }
}

impl Side for Server {
    fn id(&self) -> &Id {
        &self.id
    }

    fn timeout(&self) -> Timeout {
        self.timeout.into()
    }

    fn kexinit(&self) -> KexInit {
        let mut kexinit = self.algorithms.kexinit(false);

        kexinit.server_host_key_algorithms = kexinit
            .server_host_key_algorithms
            .iter()
            .filter(|name| {
                Key::from_str(name)
                    .ok()
                    .and_then(|algorithm| self.key(&algorithm))
                    .is_some()
            })
            .collect::<NameList>();

        kexinit
    }

    async fn identify(&self, stream: &mut impl Pipe) -> Result<Id> {
        receive_then_send(stream, &self.id, self.timeout(), false).await
    }

    async fn guess(&self, _: &mut Stream<impl Pipe>, _: &KexInit) -> Result<Option<Ephemeral>> {
        Ok(None)
    }

    fn negotiate(&self, ours: &KexInit, theirs: &KexInit) -> Result<Negotiated> {
        Ok(negotiate(theirs, ours)?)
    }

    async fn exchange(
        &self,
        stream: &mut Stream<impl Pipe>,
        kexinits: KexInits<'_>,
        negotiated: &Negotiated,
        _: Option<Ephemeral>,
        peer_id: &Id,
    ) -> Result<TransportPair> {
        let KexInits {
            ours: (kexinit, payload),
            theirs: (peerkexinit, peerpayload),
        } = kexinits;

        if peerkexinit.first_kex_packet_follows && !guessed_right(peerkexinit, kexinit) {
            let discarded = stream.recv_kex().await?;

            tracing::debug!(
                "Discarded wrongly guessed key-exchange packet {:?}",
                discarded.code()
            );
        }

        let kex = negotiated.parse::<Kex>(Category::KeyExchange)?;
        let algorithm = negotiated.parse::<Key>(Category::ServerHostKey)?;
        let key = self.key(&algorithm).ok_or(KexError::UnknownHostKey)?;

        kex.as_server(
            stream,
            key,
            algorithm,
            KexMeta::client(peer_id, peerpayload, negotiated)?,
            KexMeta::server(&self.id, payload, negotiated)?,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(algorithm: Key) -> PrivateKey {
        PrivateKey::random(&mut rand::thread_rng(), algorithm).expect("key generation")
    }

    #[test]
    fn host_keys_are_restricted_to_owned_keys() {
        let server = Server {
            keys: vec![key(Key::Ed25519)],
            ..Default::default()
        };

        let kexinit = server.kexinit();

        assert_eq!(
            kexinit.server_host_key_algorithms,
            NameList::new(["ssh-ed25519"])
        );
        assert!(!kexinit.first_kex_packet_follows);
    }

    #[test]
    fn keyless_servers_advertise_no_host_key() {
        assert!(Server::default()
            .kexinit()
            .server_host_key_algorithms
            .is_empty());
    }
}
