//! Client-[`Side`] implementation of the _session_.

use std::{sync::Arc, time::Duration};

use futures_time::time::Duration as Timeout;

use super::{send_then_receive, KexInits, Side};
use crate::{
    algorithm::{
        guessed_right,
        kex::{Ephemeral, KexMeta},
        negotiate, AcceptAll, Catalog, Category, HostKeyVerifier, Kex, Key, Negotiated,
    },
    id::Id,
    stream::{Stream, TransportPair},
    wire::trans::{KexInit, KexdhInit},
    Pipe, Result,
};

/// A _client_-side session configuration.
#[derive(Debug, Clone)]
pub struct Client {
    /// [`Id`] for this _client_ session.
    pub id: Id,

    /// Timeout for sending and receiving packets.
    pub timeout: Duration,

    /// The algorithms enabled for this _client_ session.
    pub algorithms: Arc<Catalog>,

    /// The policy deciding whether to trust the server's host key.
    pub verifier: Arc<dyn HostKeyVerifier>,

    /// Send a guessed `SSH_MSG_KEXDH_INIT` right after our `SSH_MSG_KEXINIT`,
    /// for our preferred key-exchange method.
    pub guess: bool,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            id: Id::local("client"),
            timeout: Duration::from_secs(120),
            algorithms: Default::default(),
            verifier: Arc::new(AcceptAll),
            guess: false,
        }
    }
}

impl Side for Client {
    fn id(&self) -> &Id {
        &self.id
    }

    fn timeout(&self) -> Timeout {
        self.timeout.into()
    }

    fn kexinit(&self) -> KexInit {
        self.algorithms.kexinit(self.guess)
    }

    async fn identify(&self, stream: &mut impl Pipe) -> Result<Id> {
        send_then_receive(stream, &self.id, self.timeout(), true).await
    }

    async fn guess(
        &self,
        stream: &mut Stream<impl Pipe>,
        kexinit: &KexInit,
    ) -> Result<Option<Ephemeral>> {
        if !kexinit.first_kex_packet_follows {
            return Ok(None);
        }

        let Some(kex) = kexinit
            .kex_algorithms
            .first()
            .and_then(|name| name.parse::<Kex>().ok())
        else {
            return Ok(None);
        };

        tracing::debug!("Guessing key-exchange method `{}`", kex.as_ref());

        let ephemeral = kex.ephemeral();
        stream
            .send(&KexdhInit {
                e: ephemeral.public().into(),
            })
            .await?;

        Ok(Some(ephemeral))
    }

    fn negotiate(&self, ours: &KexInit, theirs: &KexInit) -> Result<Negotiated> {
        Ok(negotiate(ours, theirs)?)
    }

    async fn exchange(
        &self,
        stream: &mut Stream<impl Pipe>,
        kexinits: KexInits<'_>,
        negotiated: &Negotiated,
        guess: Option<Ephemeral>,
        peer_id: &Id,
    ) -> Result<TransportPair> {
        let KexInits {
            ours: (kexinit, payload),
            theirs: (peerkexinit, peerpayload),
        } = kexinits;

        let guess = guess.filter(|_| guessed_right(kexinit, peerkexinit));

        let kex = negotiated.parse::<Kex>(Category::KeyExchange)?;
        let key = negotiated.parse::<Key>(Category::ServerHostKey)?;

        kex.as_client(
            stream,
            guess,
            key,
            &*self.verifier,
            KexMeta::client(&self.id, payload, negotiated)?,
            KexMeta::server(peer_id, peerpayload, negotiated)?,
        )
        .await
    }
}
