use crate::error::ChainError;
use crate::order::Balance;
use std::collections::BTreeMap;

/// Working balance map used while matching a block.
///
/// Keyed by asset, then client. Built from a block's balance list, mutated
/// trade by trade, and flattened back into a list afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSheet {
    assets: BTreeMap<String, BTreeMap<String, i64>>,
}

impl BalanceSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a balance list. Each `(client, asset)` pair may appear once.
    pub fn from_balances(balances: &[Balance]) -> Result<Self, ChainError> {
        let mut sheet = Self::new();
        for balance in balances {
            let clients = sheet.assets.entry(balance.asset.clone()).or_default();
            if clients.contains_key(&balance.client_id) {
                return Err(ChainError::DuplicateBalance {
                    client_id: balance.client_id.clone(),
                    asset: balance.asset.clone(),
                });
            }
            clients.insert(balance.client_id.clone(), balance.quantity);
        }
        Ok(sheet)
    }

    pub fn get(&self, client_id: &str, asset: &str) -> i64 {
        self.assets
            .get(asset)
            .and_then(|clients| clients.get(client_id))
            .copied()
            .unwrap_or(0)
    }

    /// Add `amount` (possibly negative) to a client's holding of `asset`.
    pub fn credit(&mut self, client_id: &str, asset: &str, amount: i64) -> Result<(), ChainError> {
        let entry = self
            .assets
            .entry(asset.to_string())
            .or_default()
            .entry(client_id.to_string())
            .or_insert(0);
        *entry = entry.checked_add(amount).ok_or_else(|| {
            ChainError::ArithmeticOverflow(format!("balance of {} for {}", asset, client_id))
        })?;
        Ok(())
    }

    /// Apply several credits as one unit: either all land or none do.
    pub fn credit_all(&mut self, credits: &[(&str, &str, i64)]) -> Result<(), ChainError> {
        for (applied, (client_id, asset, amount)) in credits.iter().enumerate() {
            if let Err(err) = self.credit(client_id, asset, *amount) {
                for (client_id, asset, amount) in credits[..applied].iter().rev() {
                    self.credit(client_id, asset, -amount)?;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.assets.values().map(|clients| clients.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten back into a balance list. Order is unspecified; callers sort by hash.
    pub fn into_balances(self) -> Vec<Balance> {
        self.assets
            .into_iter()
            .flat_map(|(asset, clients)| {
                clients
                    .into_iter()
                    .map(move |(client_id, quantity)| Balance::new(client_id, asset.clone(), quantity))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_balance_is_rejected() {
        let balances = vec![
            Balance::new("Ada", "ETH", 1),
            Balance::new("Bob", "ETH", 2),
            Balance::new("Ada", "ETH", 3),
        ];
        let err = BalanceSheet::from_balances(&balances).unwrap_err();
        assert_eq!(
            err,
            ChainError::DuplicateBalance {
                client_id: "Ada".to_string(),
                asset: "ETH".to_string()
            }
        );
    }

    #[test]
    fn test_same_client_different_assets_is_fine() {
        let balances = vec![Balance::new("Ada", "ETH", 1), Balance::new("Ada", "BTC", -4)];
        let sheet = BalanceSheet::from_balances(&balances).unwrap();
        assert_eq!(sheet.get("Ada", "ETH"), 1);
        assert_eq!(sheet.get("Ada", "BTC"), -4);
        assert_eq!(sheet.get("Bob", "BTC"), 0);
        assert_eq!(sheet.len(), 2);
    }

    #[test]
    fn test_credit_creates_and_updates_entries() {
        let mut sheet = BalanceSheet::new();
        sheet.credit("Ada", "ETH", 100).unwrap();
        sheet.credit("Ada", "ETH", -30).unwrap();
        sheet.credit("Bob", "ETH", -70).unwrap();
        assert_eq!(sheet.get("Ada", "ETH"), 70);
        assert_eq!(sheet.get("Bob", "ETH"), -70);
    }

    #[test]
    fn test_credit_overflow() {
        let mut sheet = BalanceSheet::from_balances(&[Balance::new("Ada", "ETH", i64::MAX)]).unwrap();
        let err = sheet.credit("Ada", "ETH", 1).unwrap_err();
        assert!(matches!(err, ChainError::ArithmeticOverflow(_)));
        assert_eq!(sheet.get("Ada", "ETH"), i64::MAX);
    }

    #[test]
    fn test_credit_all_rolls_back() {
        let mut sheet = BalanceSheet::from_balances(&[Balance::new("Bob", "BTC", i64::MAX)]).unwrap();
        let result = sheet.credit_all(&[("Ada", "ETH", 5), ("Bob", "BTC", 1)]);
        assert!(result.is_err());
        assert_eq!(sheet.get("Ada", "ETH"), 0);
        assert_eq!(sheet.get("Bob", "BTC"), i64::MAX);
    }

    #[test]
    fn test_round_trip_keeps_zero_entries() {
        let balances = vec![Balance::new("Ada", "ETH", 0)];
        let sheet = BalanceSheet::from_balances(&balances).unwrap();
        assert_eq!(sheet.into_balances(), balances);
    }
}
