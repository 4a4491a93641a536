//! `Handle`: a typed async facade over the raw [`Command`] channel.

use std::time::Duration;

use bytes::Bytes;
use driftnet_core::{Endpoint, Headers, NodeId};
use tokio::sync::{mpsc, oneshot};

use crate::command::Command;
use crate::error::HandleError;

/// A cloneable handle to a running (or not-yet-started) node engine.
///
/// Every method hides the request/reply plumbing: it sends a [`Command`]
/// and, where the command table implies a reply, awaits the paired
/// `oneshot::Receiver`.
#[derive(Debug, Clone)]
pub struct Handle {
    commands: mpsc::Sender<Command>,
}

impl Handle {
    pub fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    async fn send(&self, command: Command) -> Result<(), HandleError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| HandleError::EngineGone)
    }

    async fn ask<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, HandleError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| HandleError::NoReply)
    }

    pub async fn set_name(&self, name: impl Into<String>) -> Result<(), HandleError> {
        Ok(self.ask(|tx| Command::SetName(name.into(), tx)).await??)
    }

    pub async fn set_header(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HandleError> {
        Ok(self
            .ask(|tx| Command::SetHeader(key.into(), value.into(), tx))
            .await??)
    }

    pub async fn set_port(&self, port: u16) -> Result<(), HandleError> {
        Ok(self.ask(|tx| Command::SetPort(port, tx)).await??)
    }

    pub async fn set_interval(&self, interval: Duration) -> Result<(), HandleError> {
        Ok(self.ask(|tx| Command::SetInterval(interval, tx)).await??)
    }

    pub async fn set_verbose(&self, verbose: bool) -> Result<(), HandleError> {
        Ok(self.ask(|tx| Command::SetVerbose(verbose, tx)).await??)
    }

    pub async fn uuid(&self) -> Result<NodeId, HandleError> {
        self.ask(Command::Uuid).await
    }

    pub async fn name(&self) -> Result<String, HandleError> {
        self.ask(Command::Name).await
    }

    pub async fn endpoint(&self) -> Result<Option<Endpoint>, HandleError> {
        self.ask(Command::Endpoint).await
    }

    pub async fn start(&self) -> Result<(), HandleError> {
        Ok(self.ask(Command::Start).await??)
    }

    pub async fn stop(&self) -> Result<(), HandleError> {
        self.ask(Command::Stop).await
    }

    pub async fn join(&self, group: impl Into<String>) -> Result<(), HandleError> {
        self.send(Command::Join(group.into())).await
    }

    pub async fn leave(&self, group: impl Into<String>) -> Result<(), HandleError> {
        self.send(Command::Leave(group.into())).await
    }

    pub async fn whisper(&self, peer: NodeId, content: Vec<Bytes>) -> Result<(), HandleError> {
        self.send(Command::Whisper { peer, content }).await
    }

    pub async fn shout(
        &self,
        group: impl Into<String>,
        content: Vec<Bytes>,
    ) -> Result<(), HandleError> {
        self.send(Command::Shout {
            group: group.into(),
            content,
        })
        .await
    }

    pub async fn peers(&self) -> Result<Vec<NodeId>, HandleError> {
        self.ask(Command::Peers).await
    }

    pub async fn peers_by_group(&self, group: impl Into<String>) -> Result<Vec<NodeId>, HandleError> {
        let group = group.into();
        self.ask(|tx| Command::PeersByGroup(group, tx)).await
    }

    pub async fn peer_endpoint(&self, peer: NodeId) -> Result<Option<Endpoint>, HandleError> {
        self.ask(|tx| Command::PeerEndpoint(peer, tx)).await
    }

    pub async fn peer_name(&self, peer: NodeId) -> Result<Option<String>, HandleError> {
        self.ask(|tx| Command::PeerName(peer, tx)).await
    }

    pub async fn peer_header(
        &self,
        peer: NodeId,
        key: impl Into<String>,
    ) -> Result<Option<String>, HandleError> {
        let key = key.into();
        self.ask(|tx| Command::PeerHeader(peer, key, tx)).await
    }

    pub async fn peer_headers(&self, peer: NodeId) -> Result<Option<Headers>, HandleError> {
        self.ask(|tx| Command::PeerHeaders(peer, tx)).await
    }

    pub async fn own_groups(&self) -> Result<Vec<String>, HandleError> {
        self.ask(Command::OwnGroups).await
    }

    pub async fn peer_groups(&self, peer: NodeId) -> Result<Vec<String>, HandleError> {
        self.ask(|tx| Command::PeerGroups(peer, tx)).await
    }
}
