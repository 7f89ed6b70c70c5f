use crate::blockchain::core::validation::{check_candidate, verify_chain};
use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::hash::{hash, BlockHash};
use crate::matching::MatchingEngine;
use crate::miner::Miner;
use crate::order::{Balance, Order};
use crate::persistence::{InMemoryPersistence, Persistence};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Unmined block body: orders still to be matched and balances carried forward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub orders: Vec<Order>,
    pub balances: Vec<Balance>,
    /// Hash of the block this one was matched from. Absent for the first block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_block_hash: Option<BlockHash>,
}

/// A block body together with the nonce that satisfies proof-of-work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedBlock {
    #[serde(flatten)]
    pub body: Block,
    pub nonce: u64,
    /// Node that mined the block.
    pub client_id: String,
}

impl MinedBlock {
    pub fn new(body: Block, nonce: u64, client_id: impl Into<String>) -> Self {
        MinedBlock {
            body,
            nonce,
            client_id: client_id.into(),
        }
    }

    pub fn hash(&self) -> Result<BlockHash> {
        hash(self)
    }
}

/// Anything the matching engine can derive a next block from.
///
/// The record is hashed as a whole for the next block's `prevBlockHash`, so a
/// mined block links through its nonce and miner as well as its body.
pub trait BlockRecord: Serialize {
    fn body(&self) -> &Block;
}

impl BlockRecord for Block {
    fn body(&self) -> &Block {
        self
    }
}

impl BlockRecord for MinedBlock {
    fn body(&self) -> &Block {
        &self.body
    }
}

/// Everything a peer needs to catch up with this node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub chain: Vec<MinedBlock>,
    pub current: Block,
}

/// Append-only chain of mined blocks plus the pending block being mined on top of it.
///
/// `current` is always derived from scratch: the head is run through the
/// matching engine and the orders received since then are appended. Any event
/// that changes it (a new order, a new head) also replaces the miner.
pub struct Blockchain {
    config: ChainConfig,
    client_id: String,
    engine: MatchingEngine,
    blocks: Vec<MinedBlock>,
    current: Block,
    pending: Vec<Order>,
    /// Id of every order in a mined block or in `pending`, filled or not.
    seen_orders: HashSet<String>,
    miner: Miner,
    persistence: Box<dyn Persistence>,
}

impl Blockchain {
    /// Create an empty chain using an in-memory persistence backend.
    pub fn new(config: ChainConfig, client_id: &str) -> Result<Self> {
        Self::from_chain(config, client_id, Vec::new(), Box::new(InMemoryPersistence::new()))
    }

    /// Resume from whatever chain `persistence` holds.
    pub fn with_persistence(
        config: ChainConfig,
        client_id: &str,
        persistence: Box<dyn Persistence>,
    ) -> Result<Self> {
        let blocks = persistence.load_chain()?;
        let blockchain = Self::restore(config, client_id, blocks, persistence)?;
        info!(height = blockchain.height(), "loaded chain from persistence");
        Ok(blockchain)
    }

    /// Adopt an existing chain after verifying it block by block, and store it.
    pub fn from_chain(
        config: ChainConfig,
        client_id: &str,
        blocks: Vec<MinedBlock>,
        persistence: Box<dyn Persistence>,
    ) -> Result<Self> {
        let blockchain = Self::restore(config, client_id, blocks, persistence)?;
        blockchain.persistence.save_chain(&blockchain.blocks)?;
        Ok(blockchain)
    }

    /// Adopt a peer's snapshot: its chain, then any of its pending orders we
    /// would not already derive ourselves.
    pub fn from_snapshot(
        config: ChainConfig,
        client_id: &str,
        snapshot: ChainSnapshot,
        persistence: Box<dyn Persistence>,
    ) -> Result<Self> {
        let mut blockchain = Self::from_chain(config, client_id, snapshot.chain, persistence)?;
        for order in snapshot.current.orders {
            if !blockchain.has_order(&order.id) {
                blockchain.add_order(order)?;
            }
        }
        Ok(blockchain)
    }

    fn restore(
        config: ChainConfig,
        client_id: &str,
        blocks: Vec<MinedBlock>,
        persistence: Box<dyn Persistence>,
    ) -> Result<Self> {
        config.validate()?;
        if client_id.is_empty() {
            return Err(ChainError::ConfigError("client id must not be empty".to_string()));
        }

        let engine = MatchingEngine::new(&config);
        verify_chain(&blocks, &engine, config.difficulty)?;

        let current = Self::derive_current(&engine, blocks.last(), &[])?;
        let seen_orders = blocks
            .iter()
            .flat_map(|block| block.body.orders.iter().map(|o| o.id.clone()))
            .collect();
        let miner = Miner::new(current.clone(), client_id, config.difficulty);

        Ok(Blockchain {
            config,
            client_id: client_id.to_string(),
            engine,
            blocks,
            current,
            pending: Vec::new(),
            seen_orders,
            miner,
            persistence,
        })
    }

    fn derive_current(engine: &MatchingEngine, head: Option<&MinedBlock>, pending: &[Order]) -> Result<Block> {
        let mut current = match head {
            Some(head) => engine.match_block(head)?,
            None => Block::default(),
        };
        current.orders.extend(pending.iter().cloned());
        Ok(current)
    }

    fn reset_mining(&mut self) {
        self.miner = Miner::new(self.current.clone(), self.client_id.as_str(), self.config.difficulty);
        debug!(orders = self.current.orders.len(), "miner restarted");
    }

    /// Queue an order for the next block and restart mining.
    ///
    /// The order is refused if its id was ever seen, or if matching the
    /// resulting block would fail. Either way nothing changes.
    pub fn add_order(&mut self, order: Order) -> Result<()> {
        if self.has_order(&order.id) {
            return Err(ChainError::DuplicateOrder(order.id));
        }

        let id = order.id.clone();
        let mut pending = self.pending.clone();
        pending.push(order);
        let current = Self::derive_current(&self.engine, self.blocks.last(), &pending)?;
        // A block that cannot be matched would be mined and then never appended.
        self.engine.match_block(&current)?;

        self.seen_orders.insert(id);
        self.pending = pending;
        self.current = current;
        self.reset_mining();
        Ok(())
    }

    /// Spend up to `budget` proof-of-work attempts on the current block.
    ///
    /// On success the block is appended and returned.
    pub fn mine(&mut self, budget: u64) -> Result<Option<MinedBlock>> {
        let Some(block) = self.miner.step(budget)? else {
            return Ok(None);
        };

        self.append(block.clone())?;
        info!(
            height = self.height(),
            nonce = block.nonce,
            orders = block.body.orders.len(),
            "mined new block"
        );
        Ok(Some(block))
    }

    /// Mine with the configured per-tick budget.
    pub fn mine_tick(&mut self) -> Result<Option<MinedBlock>> {
        self.mine(self.config.mining_iterations_per_tick)
    }

    /// Accept a block mined elsewhere.
    ///
    /// Returns `Ok(false)` without touching any state when the block fails
    /// proof-of-work, does not extend our head, or carries balances that
    /// differ from the ones we derived.
    pub fn accept_block(&mut self, block: MinedBlock) -> Result<bool> {
        if let Some(rejection) = check_candidate(&block, self.blocks.last(), &self.current, self.config.difficulty)? {
            warn!(from = %block.client_id, %rejection, "rejected block");
            return Ok(false);
        }

        let from = block.client_id.clone();
        self.append(block)?;
        info!(height = self.height(), %from, "accepted block");
        Ok(true)
    }

    fn append(&mut self, block: MinedBlock) -> Result<()> {
        let carried: Vec<Order> = self
            .pending
            .iter()
            .filter(|order| !block.body.orders.iter().any(|o| o.id == order.id))
            .cloned()
            .collect();
        let current = Self::derive_current(&self.engine, Some(&block), &carried)?;

        let height = self.blocks.len() as u64;
        if let Err(e) = self.persistence.save_block(height, &block) {
            warn!(height, error = %e, "failed to persist block");
        }

        self.seen_orders
            .extend(block.body.orders.iter().map(|o| o.id.clone()));
        self.blocks.push(block);
        self.current = current;
        self.pending = carried;
        self.reset_mining();
        Ok(())
    }

    /// Whether an order with this id was ever queued or mined, including
    /// orders that have since been filled.
    pub fn has_order(&self, order_id: &str) -> bool {
        self.seen_orders.contains(order_id)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain: self.blocks.clone(),
            current: self.current.clone(),
        }
    }

    pub fn blocks(&self) -> &[MinedBlock] {
        &self.blocks
    }

    pub fn head(&self) -> Option<&MinedBlock> {
        self.blocks.last()
    }

    pub fn head_hash(&self) -> Result<Option<BlockHash>> {
        self.head().map(MinedBlock::hash).transpose()
    }

    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    pub fn current(&self) -> &Block {
        &self.current
    }

    /// Orders received since the head was appended.
    pub fn pending_orders(&self) -> &[Order] {
        &self.pending
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Balance as of the current block.
    pub fn balance(&self, client_id: &str, asset: &str) -> i64 {
        self.current
            .balances
            .iter()
            .find(|b| b.client_id == client_id && b.asset == asset)
            .map(|b| b.quantity)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;

    fn config() -> ChainConfig {
        ChainConfig::new(1, 1_000, "BTC")
    }

    fn mine_until_done(chain: &mut Blockchain) -> MinedBlock {
        loop {
            if let Some(block) = chain.mine(64).unwrap() {
                return block;
            }
        }
    }

    #[test]
    fn test_new_chain_is_empty_genesis() {
        let chain = Blockchain::new(config(), "Ada").unwrap();
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.current(), &Block::default());
        assert_eq!(chain.head_hash().unwrap(), None);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = Blockchain::new(ChainConfig::new(1, 0, "BTC"), "Ada");
        assert!(matches!(result, Err(ChainError::ConfigError(_))));
    }

    #[test]
    fn test_add_order_extends_current_and_restarts_miner() {
        let mut chain = Blockchain::new(ChainConfig::new(64, 10, "BTC"), "Ada").unwrap();
        assert_eq!(chain.mine(10).unwrap(), None);
        assert_eq!(chain.miner().nonce(), 10);

        chain.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap();

        assert_eq!(chain.current().orders.len(), 1);
        assert_eq!(chain.miner().nonce(), 0);
        assert_eq!(chain.miner().body(), chain.current());
    }

    #[test]
    fn test_duplicate_order_id_is_refused() {
        let mut chain = Blockchain::new(config(), "Ada").unwrap();
        chain.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap();
        let err = chain.add_order(Order::sell("1", "Bob", "ETH", 100, 2)).unwrap_err();
        assert_eq!(err, ChainError::DuplicateOrder("1".to_string()));
        assert_eq!(chain.current().orders.len(), 1);
    }

    #[test]
    fn test_filled_order_cannot_be_replayed() {
        let mut chain = Blockchain::new(config(), "Ada").unwrap();
        chain.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap();
        chain.add_order(Order::sell("2", "Bob", "ETH", 100, 2)).unwrap();
        mine_until_done(&mut chain);
        assert!(chain.current().orders.is_empty());
        assert_eq!(chain.balance("Ada", "ETH"), 100);

        let err = chain.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap_err();
        assert_eq!(err, ChainError::DuplicateOrder("1".to_string()));
        assert!(chain.has_order("2"));
        assert!(chain.current().orders.is_empty());

        // The replay never reaches a block, so the fill is counted once.
        chain.add_order(Order::sell("3", "Bob", "ETH", 100, 2)).unwrap();
        mine_until_done(&mut chain);
        mine_until_done(&mut chain);
        assert_eq!(chain.balance("Ada", "ETH"), 100);
        assert_eq!(chain.balance("Ada", "BTC"), -200);
    }

    #[test]
    fn test_seen_orders_survive_restore() {
        let store = InMemoryPersistence::new();
        let mut chain = Blockchain::with_persistence(config(), "Ada", Box::new(store.clone())).unwrap();
        chain.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap();
        chain.add_order(Order::sell("2", "Bob", "ETH", 100, 2)).unwrap();
        mine_until_done(&mut chain);

        let mut restored = Blockchain::with_persistence(config(), "Ada", Box::new(store)).unwrap();
        let err = restored.add_order(Order::sell("2", "Bob", "ETH", 100, 2)).unwrap_err();
        assert_eq!(err, ChainError::DuplicateOrder("2".to_string()));
    }

    #[test]
    fn test_unmatchable_order_is_refused_and_mining_continues() {
        let mut chain = Blockchain::new(config(), "Ada").unwrap();
        chain.add_order(Order::buy("big-buy", "Ada", "ETH", 10_000_000_000, 10_000_000_000)).unwrap();

        let before = chain.current().clone();
        let err = chain
            .add_order(Order::sell("big-sell", "Bob", "ETH", 10_000_000_000, 10_000_000_000))
            .unwrap_err();
        assert!(matches!(err, ChainError::ArithmeticOverflow(_)));
        assert_eq!(chain.current(), &before);
        assert_eq!(chain.pending_orders().len(), 1);
        assert!(!chain.has_order("big-sell"));

        chain.add_order(Order::sell("small-sell", "Bob", "ETH", 10, 3)).unwrap();
        mine_until_done(&mut chain);
        assert_eq!(chain.height(), 1);
        mine_until_done(&mut chain);
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.balance("Ada", "ETH"), 10);
        assert_eq!(chain.balance("Bob", "BTC"), 30);
    }

    #[test]
    fn test_mined_orders_are_matched_into_next_block() {
        let mut chain = Blockchain::new(config(), "Ada").unwrap();
        chain.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap();
        chain.add_order(Order::sell("2", "Bob", "ETH", 100, 2)).unwrap();

        let block = mine_until_done(&mut chain);

        assert_eq!(chain.height(), 1);
        assert_eq!(block.body.orders.len(), 2);
        assert!(chain.current().orders.is_empty());
        assert_eq!(chain.balance("Ada", "ETH"), 100);
        assert_eq!(chain.balance("Bob", "ETH"), -100);
        assert_eq!(chain.balance("Ada", "BTC"), -200);
        assert_eq!(chain.balance("Bob", "BTC"), 200);
        assert_eq!(chain.current().prev_block_hash, Some(block.hash().unwrap()));
        assert!(chain.pending_orders().is_empty());
    }

    #[test]
    fn test_unfilled_orders_roll_forward() {
        let mut chain = Blockchain::new(config(), "Ada").unwrap();
        chain.add_order(Order::new("1", "Ada", Side::Buy, "ETH", 10, 1)).unwrap();
        chain.add_order(Order::new("2", "Bob", Side::Sell, "ETH", 10, 5)).unwrap();
        mine_until_done(&mut chain);

        assert_eq!(chain.current().orders.len(), 2);
        assert!(chain.has_order("1"));
        assert!(chain.current().balances.is_empty());
    }

    #[test]
    fn test_accept_block_from_peer() {
        let mut ada = Blockchain::new(config(), "Ada").unwrap();
        let mut bob = Blockchain::new(config(), "Bob").unwrap();

        let block = mine_until_done(&mut ada);
        assert!(bob.accept_block(block.clone()).unwrap());
        assert_eq!(bob.blocks(), &[block]);
        assert_eq!(bob.current(), ada.current());
    }

    #[test]
    fn test_accept_rejects_bad_linkage() {
        let mut ada = Blockchain::new(config(), "Ada").unwrap();
        let mut bob = Blockchain::new(config(), "Bob").unwrap();

        mine_until_done(&mut bob);
        let stale = mine_until_done(&mut ada);

        // Bob already extended genesis; Ada's block points at nothing.
        assert!(!bob.accept_block(stale).unwrap());
        assert_eq!(bob.height(), 1);
    }

    #[test]
    fn test_accept_rejects_bad_proof_of_work() {
        let mut ada = Blockchain::new(ChainConfig::new(2, 1_000, "BTC"), "Ada").unwrap();
        let mut block = loop {
            if let Some(block) = ada.mine(1_000).unwrap() {
                break block;
            }
        };
        let mut bob = Blockchain::new(ChainConfig::new(2, 1_000, "BTC"), "Bob").unwrap();
        while crate::miner::check_block(&block, 2).unwrap() {
            block.nonce += 1;
        }
        let current = bob.current().clone();
        assert!(!bob.accept_block(block).unwrap());
        assert_eq!(bob.current(), &current);
        assert_eq!(bob.height(), 0);
    }

    #[test]
    fn test_pending_orders_survive_peer_block() {
        let mut ada = Blockchain::new(config(), "Ada").unwrap();
        let mut bob = Blockchain::new(config(), "Bob").unwrap();

        let block = mine_until_done(&mut ada);
        bob.add_order(Order::buy("late", "Bob", "ETH", 5, 5)).unwrap();

        // Bob's pending set differs, but balances agree, so the block is valid.
        assert!(bob.accept_block(block).unwrap());
        assert!(bob.has_order("late"));
        assert_eq!(bob.pending_orders().len(), 1);
    }

    #[test]
    fn test_snapshot_restores_chain_and_pending_orders() {
        let mut ada = Blockchain::new(config(), "Ada").unwrap();
        ada.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap();
        ada.add_order(Order::sell("2", "Bob", "ETH", 40, 2)).unwrap();
        mine_until_done(&mut ada);
        ada.add_order(Order::sell("3", "Bob", "ETH", 60, 2)).unwrap();

        let bob = Blockchain::from_snapshot(
            config(),
            "Bob",
            ada.snapshot(),
            Box::new(InMemoryPersistence::new()),
        )
        .unwrap();

        assert_eq!(bob.blocks(), ada.blocks());
        assert_eq!(bob.current(), ada.current());
    }

    #[test]
    fn test_from_chain_rejects_tampered_chain() {
        let mut ada = Blockchain::new(ChainConfig::new(0, 10, "BTC"), "Ada").unwrap();
        ada.add_order(Order::buy("1", "Ada", "ETH", 100, 2)).unwrap();
        ada.add_order(Order::sell("2", "Bob", "ETH", 100, 2)).unwrap();
        ada.mine(1).unwrap();
        ada.mine(1).unwrap();

        let mut blocks = ada.blocks().to_vec();
        blocks[1].body.balances[0].quantity += 1;

        let result = Blockchain::from_chain(
            ChainConfig::new(0, 10, "BTC"),
            "Bob",
            blocks,
            Box::new(InMemoryPersistence::new()),
        );
        assert!(matches!(result, Err(ChainError::InvalidChain(_))));
    }

    #[test]
    fn test_mined_block_wire_shape() {
        let block = MinedBlock::new(Block::default(), 7, "Ada");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["nonce"], 7);
        assert_eq!(json["clientId"], "Ada");
        assert!(json["orders"].is_array());
        assert!(json.get("prevBlockHash").is_none());

        let back: MinedBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }
}
