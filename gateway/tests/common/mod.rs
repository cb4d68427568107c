//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use voicelist_gateway::core::upstream::{
    ConnectError, ConnectResult, UpstreamConnector, UpstreamLink, UpstreamPeer,
};

/// How long a test waits for any single message.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(2);

/// Connector that hands every opened link's transport side to the test.
pub struct ScriptedConnector {
    peers: mpsc::UnboundedSender<UpstreamPeer>,
    fail: bool,
}

impl ScriptedConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UpstreamPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peers: tx, fail: false }, rx)
    }

    pub fn failing() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { peers: tx, fail: true }
    }
}

#[async_trait]
impl UpstreamConnector for ScriptedConnector {
    async fn connect(&self) -> ConnectResult<UpstreamLink> {
        if self.fail {
            return Err(ConnectError::ConnectionFailed("connection refused".to_string()));
        }
        let (link, peer) = UpstreamLink::channel(16);
        let _ = self.peers.send(peer);
        Ok(link)
    }

    fn is_configured(&self) -> bool {
        !self.fail
    }
}

/// Wait for the next peer handed out by a [`ScriptedConnector`].
pub async fn next_peer(peers: &mut mpsc::UnboundedReceiver<UpstreamPeer>) -> UpstreamPeer {
    timeout(STEP_TIMEOUT, peers.recv())
        .await
        .expect("timed out waiting for upstream connect")
        .expect("connector dropped")
}
