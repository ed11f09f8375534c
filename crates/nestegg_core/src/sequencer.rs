//! Account sequencing: which accounts a withdrawal is drawn from, in what order

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::model::{AccountId, AccountSnapshot};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum AccountSequencer {
    /// Taxable, then tax-deferred, then tax-free
    #[default]
    TaxEfficient,
    /// Every account contributes in proportion to its balance
    ProRata,
    /// Accounts owing a minimum distribution first (largest minimum first),
    /// then tax-efficient
    RmdFirst,
    /// Listed accounts in order; unlisted accounts follow tax-efficiently
    Custom { order: Vec<AccountId> },
}

/// Larger balance first, then lower id
fn tie_break(a: &AccountSnapshot, b: &AccountSnapshot) -> Ordering {
    b.balance
        .total_cmp(&a.balance)
        .then_with(|| a.account_id.cmp(&b.account_id))
}

fn tax_efficient(a: &AccountSnapshot, b: &AccountSnapshot) -> Ordering {
    a.tax_status
        .tax_efficient_rank()
        .cmp(&b.tax_status.tax_efficient_rank())
        .then_with(|| tie_break(a, b))
}

impl AccountSequencer {
    #[must_use]
    pub fn is_pro_rata(&self) -> bool {
        matches!(self, AccountSequencer::ProRata)
    }

    /// Withdrawal order over accounts with a positive balance.
    ///
    /// `minimums` holds this period's required distribution per account and
    /// only matters for `RmdFirst`. For `ProRata` the order is the tax-efficient
    /// one; callers split amounts with [`pro_rata_split`] instead of walking it.
    #[must_use]
    pub fn order(
        &self,
        accounts: &[AccountSnapshot],
        minimums: &FxHashMap<AccountId, f64>,
    ) -> Vec<AccountId> {
        let mut funded: Vec<&AccountSnapshot> =
            accounts.iter().filter(|a| a.balance > 0.0).collect();

        match self {
            AccountSequencer::TaxEfficient | AccountSequencer::ProRata => {
                funded.sort_by(|a, b| tax_efficient(a, b));
            }
            AccountSequencer::RmdFirst => {
                let min_of = |a: &AccountSnapshot| {
                    minimums.get(&a.account_id).copied().unwrap_or(0.0)
                };
                funded.sort_by(|a, b| {
                    let (ma, mb) = (min_of(a), min_of(b));
                    match (ma > 0.0, mb > 0.0) {
                        (true, true) => mb.total_cmp(&ma).then_with(|| tie_break(a, b)),
                        (true, false) => Ordering::Less,
                        (false, true) => Ordering::Greater,
                        (false, false) => tax_efficient(a, b),
                    }
                });
            }
            AccountSequencer::Custom { order } => {
                let position = |id: AccountId| order.iter().position(|o| *o == id);
                funded.sort_by(|a, b| {
                    match (position(a.account_id), position(b.account_id)) {
                        (Some(pa), Some(pb)) => pa.cmp(&pb),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => tax_efficient(a, b),
                    }
                });
            }
        }

        funded.into_iter().map(|a| a.account_id).collect()
    }
}

/// Split `amount` across `available` balances in proportion to balance.
///
/// Any share that would exceed an account's balance is capped and the excess
/// redistributed over the accounts that still have room. The result never
/// exceeds an account's balance; it totals `min(amount, sum of balances)`.
#[must_use]
pub fn pro_rata_split(available: &[(AccountId, f64)], amount: f64) -> Vec<(AccountId, f64)> {
    let mut taken: Vec<(AccountId, f64)> = available.iter().map(|&(id, _)| (id, 0.0)).collect();
    let mut remaining = amount.max(0.0);

    // Each pass either satisfies the remainder or exhausts at least one account
    for _ in 0..=available.len() {
        if remaining <= 1e-9 {
            break;
        }
        let room: Vec<f64> = available
            .iter()
            .zip(&taken)
            .map(|(&(_, balance), &(_, t))| (balance - t).max(0.0))
            .collect();
        let total_room: f64 = room.iter().sum();
        if total_room <= 0.0 {
            break;
        }
        let share = remaining.min(total_room);
        let mut used = 0.0;
        for (slot, r) in taken.iter_mut().zip(&room) {
            let part = (share * r / total_room).min(*r);
            slot.1 += part;
            used += part;
        }
        remaining -= used;
    }

    taken.retain(|&(_, t)| t > 0.0);
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountKind, Allocation, PersonId};

    fn snap(id: u16, kind: AccountKind, balance: f64) -> AccountSnapshot {
        AccountSnapshot {
            account_id: AccountId(id),
            name: format!("acct{id}"),
            kind,
            owner: PersonId(0),
            balance,
            tax_status: kind.tax_status(),
            subject_to_rmd: kind.rmd_eligible(),
            allocation: Allocation::default(),
        }
    }

    fn accounts() -> Vec<AccountSnapshot> {
        vec![
            snap(1, AccountKind::RothIra, 50_000.0),
            snap(2, AccountKind::TraditionalIra, 200_000.0),
            snap(3, AccountKind::Brokerage, 30_000.0),
            snap(4, AccountKind::Traditional401k, 400_000.0),
            snap(5, AccountKind::Savings, 0.0),
        ]
    }

    fn ids(v: &[u16]) -> Vec<AccountId> {
        v.iter().map(|&i| AccountId(i)).collect()
    }

    #[test]
    fn test_tax_efficient_order() {
        let order = AccountSequencer::TaxEfficient.order(&accounts(), &FxHashMap::default());
        // Empty savings account skipped; larger deferred balance first
        assert_eq!(order, ids(&[3, 4, 2, 1]));
    }

    #[test]
    fn test_tie_break_lower_id_on_equal_balance() {
        let accounts = vec![
            snap(9, AccountKind::Brokerage, 10_000.0),
            snap(4, AccountKind::Brokerage, 10_000.0),
            snap(6, AccountKind::Brokerage, 20_000.0),
        ];
        let order = AccountSequencer::TaxEfficient.order(&accounts, &FxHashMap::default());
        assert_eq!(order, ids(&[6, 4, 9]));
    }

    #[test]
    fn test_rmd_first_order() {
        let mut minimums = FxHashMap::default();
        minimums.insert(AccountId(2), 800.0);
        minimums.insert(AccountId(4), 1_600.0);
        let order = AccountSequencer::RmdFirst.order(&accounts(), &minimums);
        assert_eq!(order, ids(&[4, 2, 3, 1]));
    }

    #[test]
    fn test_custom_order_appends_unlisted() {
        let seq = AccountSequencer::Custom {
            order: ids(&[1, 2]),
        };
        let order = seq.order(&accounts(), &FxHashMap::default());
        assert_eq!(order, ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_pro_rata_split_by_balance() {
        let available = [(AccountId(1), 75_000.0), (AccountId(2), 25_000.0)];
        let split = pro_rata_split(&available, 10_000.0);
        assert_eq!(split.len(), 2);
        assert!((split[0].1 - 7_500.0).abs() < 1e-9);
        assert!((split[1].1 - 2_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_pro_rata_split_caps_at_total() {
        let available = [(AccountId(1), 300.0), (AccountId(2), 100.0), (AccountId(3), 0.0)];
        let split = pro_rata_split(&available, 1_000.0);
        let total: f64 = split.iter().map(|s| s.1).sum();
        assert!((total - 400.0).abs() < 1e-9);
        for (id, amount) in &split {
            let balance = available.iter().find(|a| a.0 == *id).unwrap().1;
            assert!(*amount <= balance + 1e-9);
        }
        assert!(split.iter().all(|s| s.0 != AccountId(3)));
    }
}
