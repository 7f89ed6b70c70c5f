//! Deterministic matching engine.
//!
//! Maps a finalized block `(orders, balances)` to the next candidate block
//! `(remaining orders, updated balances)`. The engine is a pure function of
//! its input: no clocks, no arrival order, no floating point. Two nodes that
//! match the same block derive byte-identical results, which is what lets a
//! node verify a block mined elsewhere by comparing balance hashes.
//!
//! ## Matching Rules
//!
//! - Each asset is matched independently against the default currency.
//! - The best bid level and the best ask level are taken whole. If the best
//!   bid is below the best ask nothing more can cross on that asset.
//! - Inside a pair of levels, orders are paired off in hash order; each trade
//!   fills `min(buy remaining, sell remaining)`.
//! - Trades settle at the **sell** order's price.

use crate::blockchain::{BalanceSheet, Block, BlockRecord};
use crate::config::ChainConfig;
use crate::error::{ChainError, Result};
use crate::hash::{hash, sort_by_hash};
use crate::order::{Order, Side, Trade};
use crate::orderbook::{OrderBook, PriceLevel};
use tracing::debug;

/// Next block body plus the trades executed to produce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub block: Block,
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone)]
pub struct MatchingEngine {
    currency: String,
}

impl MatchingEngine {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            currency: config.default_currency_asset.clone(),
        }
    }

    /// Asset that prices every trade.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Match `prev` into the body of the block that follows it.
    pub fn match_block<B: BlockRecord>(&self, prev: &B) -> Result<Block> {
        Ok(self.match_block_with_trades(prev)?.block)
    }

    pub fn match_block_with_trades<B: BlockRecord>(&self, prev: &B) -> Result<MatchOutcome> {
        let body = prev.body();
        let mut sheet = BalanceSheet::from_balances(&body.balances)?;
        let mut books = OrderBook::build_books(&body.orders);
        let mut trades = Vec::new();

        for (asset, book) in books.iter_mut() {
            self.match_order_book(asset, book, &mut sheet, &mut trades)?;
        }

        let orders = sort_by_hash(books.into_values().flat_map(OrderBook::into_orders).collect())?;
        let balances = sort_by_hash(sheet.into_balances())?;

        if !trades.is_empty() {
            debug!(trades = trades.len(), remaining_orders = orders.len(), "matched block");
        }

        Ok(MatchOutcome {
            block: Block {
                orders,
                balances,
                prev_block_hash: Some(hash(prev)?),
            },
            trades,
        })
    }

    /// Cross one asset's book until the best levels no longer overlap.
    fn match_order_book(
        &self,
        asset: &str,
        book: &mut OrderBook,
        sheet: &mut BalanceSheet,
        trades: &mut Vec<Trade>,
    ) -> Result<()> {
        while book.is_two_sided() {
            let (Some(mut bids), Some(mut asks)) = (book.pop_best_bids()?, book.pop_best_asks()?) else {
                break;
            };

            if bids.price < asks.price {
                book.restore(Side::Buy, bids);
                book.restore(Side::Sell, asks);
                break;
            }

            self.match_levels(&mut bids, &mut asks, sheet, trades)?;

            book.restore(Side::Buy, bids);
            book.restore(Side::Sell, asks);
        }

        debug!(asset, bids = book.bid_count(), asks = book.ask_count(), "asset book settled");
        Ok(())
    }

    /// Pair off two crossing levels in hash order until one is exhausted.
    fn match_levels(
        &self,
        bids: &mut PriceLevel,
        asks: &mut PriceLevel,
        sheet: &mut BalanceSheet,
        trades: &mut Vec<Trade>,
    ) -> Result<()> {
        while let (Some(buy), Some(sell)) = (bids.orders.front_mut(), asks.orders.front_mut()) {
            let quantity = buy.quantity.min(sell.quantity);
            trades.push(self.execute_orders(buy, sell, quantity, sheet)?);

            if buy.is_filled() {
                bids.orders.pop_front();
            }
            if sell.is_filled() {
                asks.orders.pop_front();
            }
        }
        Ok(())
    }

    /// Settle `quantity` units between two orders.
    ///
    /// The buyer gains the asset and pays `sell.price * quantity` of the
    /// default currency; the seller mirrors both legs. Both orders are
    /// decremented in place. Nothing is modified if any amount overflows.
    pub fn execute_orders(
        &self,
        buy: &mut Order,
        sell: &mut Order,
        quantity: u64,
        sheet: &mut BalanceSheet,
    ) -> Result<Trade> {
        let overflow = || ChainError::ArithmeticOverflow(format!("trade {} / {}", buy.id, sell.id));

        let buy_remaining = buy.quantity.checked_sub(quantity).ok_or_else(overflow)?;
        let sell_remaining = sell.quantity.checked_sub(quantity).ok_or_else(overflow)?;

        let trade = Trade {
            buy_order_id: buy.id.clone(),
            sell_order_id: sell.id.clone(),
            buyer: buy.client_id.clone(),
            seller: sell.client_id.clone(),
            asset: buy.asset.clone(),
            quantity,
            price: sell.price,
        };
        let asset_amount = i64::try_from(quantity).map_err(|_| overflow())?;
        let currency_amount = trade
            .notional()
            .and_then(|amount| i64::try_from(amount).ok())
            .ok_or_else(overflow)?;

        sheet.credit_all(&[
            (&buy.client_id, &buy.asset, asset_amount),
            (&sell.client_id, &sell.asset, -asset_amount),
            (&sell.client_id, &self.currency, currency_amount),
            (&buy.client_id, &self.currency, -currency_amount),
        ])?;

        buy.quantity = buy_remaining;
        sell.quantity = sell_remaining;
        debug!(buy = %trade.buy_order_id, sell = %trade.sell_order_id, quantity, price = trade.price, "trade executed");
        Ok(trade)
    }
}
