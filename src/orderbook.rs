//! Per-asset order book.
//!
//! ## Price Ordering
//!
//! - **Bids** (buy orders): best level is the highest price
//! - **Asks** (sell orders): best level is the lowest price
//!
//! Orders are grouped by price. The matching engine always takes a whole
//! price level at once and orders it by content hash, so orders that share a
//! price are matched in the same sequence on every node regardless of arrival
//! order.

use crate::error::ChainError;
use crate::hash::sort_by_hash;
use crate::order::{Order, Side};
use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};

/// All orders resting at one price, in hash order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: u64,
    pub orders: VecDeque<Order>,
}

impl PriceLevel {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_quantity(&self) -> u64 {
        self.orders.iter().map(|o| o.quantity).sum()
    }
}

/// Order book for a single asset
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// Bid levels, highest price first
    bids: BTreeMap<Reverse<u64>, Vec<Order>>,
    /// Ask levels, lowest price first
    asks: BTreeMap<u64, Vec<Order>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from orders that all belong to one asset.
    pub fn from_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let mut book = Self::new();
        for order in orders {
            book.add_order(order);
        }
        book
    }

    /// Split orders by asset and build one book per asset.
    pub fn build_books(orders: &[Order]) -> BTreeMap<String, OrderBook> {
        let mut books: BTreeMap<String, OrderBook> = BTreeMap::new();
        for order in orders {
            books.entry(order.asset.clone()).or_default().add_order(order.clone());
        }
        books
    }

    pub fn add_order(&mut self, order: Order) {
        match order.side {
            Side::Buy => self.bids.entry(Reverse(order.price)).or_default().push(order),
            Side::Sell => self.asks.entry(order.price).or_default().push(order),
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.bids.keys().next().map(|Reverse(price)| *price)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.asks.keys().next().copied()
    }

    pub fn bid_count(&self) -> usize {
        self.bids.values().map(Vec::len).sum()
    }

    pub fn ask_count(&self) -> usize {
        self.asks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Whether both sides hold orders, i.e. a match is worth attempting.
    pub fn is_two_sided(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    /// Remove the best bid level, ordered by hash.
    pub fn pop_best_bids(&mut self) -> Result<Option<PriceLevel>, ChainError> {
        match self.bids.pop_first() {
            Some((Reverse(price), orders)) => Ok(Some(Self::level(price, orders)?)),
            None => Ok(None),
        }
    }

    /// Remove the best ask level, ordered by hash.
    pub fn pop_best_asks(&mut self) -> Result<Option<PriceLevel>, ChainError> {
        match self.asks.pop_first() {
            Some((price, orders)) => Ok(Some(Self::level(price, orders)?)),
            None => Ok(None),
        }
    }

    /// Put the unfilled remainder of a popped level back on its side.
    pub fn restore(&mut self, side: Side, level: PriceLevel) {
        if level.is_empty() {
            return;
        }
        let orders: Vec<Order> = level.orders.into();
        match side {
            Side::Buy => self.bids.entry(Reverse(level.price)).or_default().extend(orders),
            Side::Sell => self.asks.entry(level.price).or_default().extend(orders),
        }
    }

    /// Consume the book, returning every resting order (unsorted).
    pub fn into_orders(self) -> Vec<Order> {
        self.bids
            .into_values()
            .chain(self.asks.into_values())
            .flatten()
            .collect()
    }

    fn level(price: u64, orders: Vec<Order>) -> Result<PriceLevel, ChainError> {
        Ok(PriceLevel {
            price,
            orders: sort_by_hash(orders)?.into(),
        })
    }
}
