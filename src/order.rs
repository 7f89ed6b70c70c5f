//! Order, balance and trade records.
//!
//! These are the wire shapes exchanged between nodes and stored in blocks.
//! Field names serialize in camelCase (`clientId`) and sides as `"BUY"` /
//! `"SELL"`, so every node hashes byte-identical documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A limit order for buying or selling an asset, priced in the default currency.
///
/// Everything except `quantity` is fixed once the order is created; the
/// matching engine only ever decrements `quantity` and drops the order when
/// it reaches zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub client_id: String,
    pub side: Side,
    pub asset: String,
    pub quantity: u64,
    pub price: u64,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        side: Side,
        asset: impl Into<String>,
        quantity: u64,
        price: u64,
    ) -> Self {
        Order {
            id: id.into(),
            client_id: client_id.into(),
            side,
            asset: asset.into(),
            quantity,
            price,
        }
    }

    pub fn buy(id: &str, client_id: &str, asset: &str, quantity: u64, price: u64) -> Self {
        Self::new(id, client_id, Side::Buy, asset, quantity, price)
    }

    pub fn sell(id: &str, client_id: &str, asset: &str, quantity: u64, price: u64) -> Self {
        Self::new(id, client_id, Side::Sell, asset, quantity, price)
    }

    pub fn is_filled(&self) -> bool {
        self.quantity == 0
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} ({})",
            self.side, self.quantity, self.asset, self.price, self.client_id
        )
    }
}

/// Holding of one asset by one client. Signed: clients may go short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub client_id: String,
    pub asset: String,
    pub quantity: i64,
}

impl Balance {
    pub fn new(client_id: impl Into<String>, asset: impl Into<String>, quantity: i64) -> Self {
        Balance {
            client_id: client_id.into(),
            asset: asset.into(),
            quantity,
        }
    }
}

/// A single execution between a buy and a sell order.
///
/// Trades always settle at the sell order's price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub buyer: String,
    pub seller: String,
    pub asset: String,
    pub quantity: u64,
    pub price: u64,
}

impl Trade {
    /// Amount of default currency that changes hands.
    pub fn notional(&self) -> Option<u64> {
        self.price.checked_mul(self.quantity)
    }
}
