//! Single-task node loop.
//!
//! A [`Node`] owns its [`Blockchain`] outright. Orders, peer blocks and
//! snapshot requests arrive on one channel, mining ticks on an interval, and
//! both are served from the same task, so chain state is never shared or
//! locked. Mining work per tick is bounded by the configured iteration budget.

use crate::blockchain::{Blockchain, ChainSnapshot, MinedBlock};
use crate::error::{ChainError, Result};
use crate::order::Order;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum NodeEvent {
    /// Order submitted by a local client.
    SubmitOrder(Order),
    /// Order relayed by another node.
    PeerOrder { from: String, order: Order },
    /// Block mined by another node.
    PeerBlock(MinedBlock),
    SnapshotRequest(oneshot::Sender<ChainSnapshot>),
    Shutdown,
}

/// Outbound side of the node. Delivery is best-effort.
pub trait Transport: Send {
    fn broadcast_order(&self, from: &str, order: &Order) -> Result<()>;
    fn broadcast_block(&self, block: &MinedBlock) -> Result<()>;
}

/// Transport for a node that talks to nobody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn broadcast_order(&self, _from: &str, _order: &Order) -> Result<()> {
        Ok(())
    }

    fn broadcast_block(&self, _block: &MinedBlock) -> Result<()> {
        Ok(())
    }
}

/// Forwards broadcasts to other nodes in the same process.
#[derive(Debug, Clone, Default)]
pub struct ChannelTransport {
    peers: Vec<NodeHandle>,
}

impl ChannelTransport {
    pub fn new(peers: Vec<NodeHandle>) -> Self {
        Self { peers }
    }

    fn fan_out(&self, make: impl Fn() -> NodeEvent) -> Result<()> {
        let mut unreachable = 0;
        for peer in &self.peers {
            if peer.send(make()).is_err() {
                unreachable += 1;
            }
        }
        if unreachable > 0 {
            return Err(ChainError::NetworkError(format!(
                "{} of {} peers unreachable",
                unreachable,
                self.peers.len()
            )));
        }
        Ok(())
    }
}

impl Transport for ChannelTransport {
    fn broadcast_order(&self, from: &str, order: &Order) -> Result<()> {
        self.fan_out(|| NodeEvent::PeerOrder {
            from: from.to_string(),
            order: order.clone(),
        })
    }

    fn broadcast_block(&self, block: &MinedBlock) -> Result<()> {
        self.fan_out(|| NodeEvent::PeerBlock(block.clone()))
    }
}

/// Sending half of a node's event channel.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl NodeHandle {
    pub fn send(&self, event: NodeEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| ChainError::NetworkError("node has shut down".to_string()))
    }

    pub fn submit_order(&self, order: Order) -> Result<()> {
        self.send(NodeEvent::SubmitOrder(order))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(NodeEvent::Shutdown)
    }

    pub async fn snapshot(&self) -> Result<ChainSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(NodeEvent::SnapshotRequest(reply))?;
        rx.await
            .map_err(|_| ChainError::NetworkError("snapshot request dropped".to_string()))
    }
}

/// Receiving half of a node's event channel.
#[derive(Debug)]
pub struct NodeInbox {
    rx: mpsc::UnboundedReceiver<NodeEvent>,
}

/// Create the event channel for one node.
pub fn channel() -> (NodeHandle, NodeInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NodeHandle { tx }, NodeInbox { rx })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NodeStats {
    pub blocks_mined: u64,
    pub blocks_accepted: u64,
    pub blocks_rejected: u64,
    pub orders_received: u64,
    pub orders_rejected: u64,
    /// Peer messages that originated from this node.
    pub echoes_ignored: u64,
}

pub struct Node<T: Transport> {
    blockchain: Blockchain,
    transport: T,
    inbox: NodeInbox,
    tick_interval: Duration,
    mining_enabled: bool,
    stats: NodeStats,
}

impl<T: Transport> Node<T> {
    pub fn new(blockchain: Blockchain, transport: T, inbox: NodeInbox, tick_interval: Duration) -> Self {
        Self {
            blockchain,
            transport,
            inbox,
            tick_interval,
            mining_enabled: true,
            stats: NodeStats::default(),
        }
    }

    /// Turn mining ticks on or off. Events are served either way.
    pub fn with_mining(mut self, enabled: bool) -> Self {
        self.mining_enabled = enabled;
        self
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn into_blockchain(self) -> Blockchain {
        self.blockchain
    }

    /// Apply one event. Returns `Ok(false)` once the node should stop.
    pub fn handle(&mut self, event: NodeEvent) -> Result<bool> {
        match event {
            NodeEvent::SubmitOrder(order) => {
                if let Err(e) = self.blockchain.add_order(order.clone()) {
                    self.stats.orders_rejected += 1;
                    return Err(e);
                }
                self.stats.orders_received += 1;
                debug!(id = %order.id, order = %order, "order submitted");
                if let Err(e) = self.transport.broadcast_order(self.blockchain.client_id(), &order) {
                    warn!(error = %e, "failed to broadcast order");
                }
            }
            NodeEvent::PeerOrder { from, order } => {
                if from == self.blockchain.client_id() {
                    self.stats.echoes_ignored += 1;
                } else if self.blockchain.has_order(&order.id) {
                    debug!(id = %order.id, %from, "order already known");
                } else {
                    self.blockchain.add_order(order)?;
                    self.stats.orders_received += 1;
                }
            }
            NodeEvent::PeerBlock(block) => {
                if block.client_id == self.blockchain.client_id() {
                    self.stats.echoes_ignored += 1;
                } else if self.blockchain.accept_block(block)? {
                    self.stats.blocks_accepted += 1;
                } else {
                    self.stats.blocks_rejected += 1;
                }
            }
            NodeEvent::SnapshotRequest(reply) => {
                if reply.send(self.blockchain.snapshot()).is_err() {
                    debug!("snapshot requester went away");
                }
            }
            NodeEvent::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    /// Spend one tick's mining budget, broadcasting the block if one is found.
    pub fn tick(&mut self) -> Result<Option<MinedBlock>> {
        let mined = self.blockchain.mine_tick()?;
        if let Some(block) = &mined {
            self.stats.blocks_mined += 1;
            if let Err(e) = self.transport.broadcast_block(block) {
                warn!(error = %e, "failed to broadcast block");
            }
        }
        Ok(mined)
    }

    /// Serve events and mining ticks until `Shutdown` arrives or every
    /// handle is dropped. Returns the node so callers can inspect it.
    pub async fn run(mut self) -> Self {
        info!(
            client_id = %self.blockchain.client_id(),
            height = self.blockchain.height(),
            tick_ms = self.tick_interval.as_millis() as u64,
            mining = self.mining_enabled,
            "node started"
        );

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = self.inbox.rx.recv() => {
                    let Some(event) = event else { break };
                    match self.handle(event) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => error!(error = %e, "failed to handle event"),
                    }
                }
                _ = ticker.tick(), if self.mining_enabled => {
                    if let Err(e) = self.tick() {
                        error!(error = %e, "mining tick failed");
                    }
                }
            }
        }

        info!(
            height = self.blockchain.height(),
            mined = self.stats.blocks_mined,
            accepted = self.stats.blocks_accepted,
            rejected = self.stats.blocks_rejected,
            "node stopped"
        );
        self
    }
}
