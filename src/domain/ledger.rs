use serde::Serialize;

use super::{Account, AccountId, Credits, Transaction, TransactionId};

/// Compute an account balance from its entries.
/// Balance = sum of amounts of completed entries.
pub fn compute_balance(transactions: &[Transaction]) -> Credits {
    transactions
        .iter()
        .filter(|t| t.is_completed())
        .map(|t| t.amount)
        .sum()
}

/// Outcome of a debit that may not exceed the available balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CappedDebit {
    /// Signed amount actually applied (zero or negative)
    pub applied: Credits,
    /// Part of the request that could not be covered
    pub shortfall: Credits,
}

/// Cap a debit of `requested` credits (a positive magnitude) at `balance`.
pub fn capped_debit(balance: Credits, requested: Credits) -> CappedDebit {
    let requested = requested.max(0);
    let covered = requested.min(balance.max(0));
    CappedDebit {
        applied: -covered,
        shortfall: requested - covered,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// Stored balance differs from the sum of completed entries
    BalanceMismatch {
        account_id: AccountId,
        stored: Credits,
        computed: Credits,
    },
    /// An entry's balance_after does not follow from the previous one
    BrokenChain {
        account_id: AccountId,
        transaction_id: TransactionId,
        expected: Credits,
        recorded: Credits,
    },
    NegativeBalance {
        account_id: AccountId,
        balance: Credits,
    },
    /// A purchase order credited more than once
    DuplicateSettlement { order_ref: String, count: i64 },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityIssue::BalanceMismatch {
                account_id,
                stored,
                computed,
            } => write!(
                f,
                "account {}: stored balance {} but completed entries sum to {}",
                account_id, stored, computed
            ),
            IntegrityIssue::BrokenChain {
                account_id,
                transaction_id,
                expected,
                recorded,
            } => write!(
                f,
                "account {}: entry {} records balance {} but replay gives {}",
                account_id, transaction_id, recorded, expected
            ),
            IntegrityIssue::NegativeBalance {
                account_id,
                balance,
            } => write!(f, "account {}: negative balance {}", account_id, balance),
            IntegrityIssue::DuplicateSettlement { order_ref, count } => write!(
                f,
                "order {} was credited {} times",
                order_ref, count
            ),
        }
    }
}

/// Check one account against its entries, which must be in append order.
///
/// Replaying every entry (reversed ones included, they were applied when written)
/// must reproduce each recorded `balance_after`, and the stored balance must equal
/// the sum of the completed entries.
pub fn check_account(account: &Account, transactions: &[Transaction]) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();
    let mut running: Credits = 0;

    for txn in transactions {
        running += txn.amount;
        if txn.balance_after != running {
            issues.push(IntegrityIssue::BrokenChain {
                account_id: account.id.clone(),
                transaction_id: txn.id,
                expected: running,
                recorded: txn.balance_after,
            });
            // Resync so one bad row is reported once
            running = txn.balance_after;
        }
    }

    let computed = compute_balance(transactions);
    if computed != account.balance {
        issues.push(IntegrityIssue::BalanceMismatch {
            account_id: account.id.clone(),
            stored: account.balance,
            computed,
        });
    }
    if account.balance < 0 {
        issues.push(IntegrityIssue::NegativeBalance {
            account_id: account.id.clone(),
            balance: account.balance,
        });
    }

    issues
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{AccountRole, NewEntry, TransactionStatus, TransactionType};

    use super::*;

    fn entry(kind: TransactionType, amount: Credits, balance_after: Credits) -> Transaction {
        NewEntry::new("acct", kind, amount, "test").into_transaction(amount, balance_after)
    }

    fn account(balance: Credits) -> Account {
        let mut account = Account::new("acct", AccountRole::Teacher);
        account.balance = balance;
        account
    }

    #[test]
    fn test_compute_balance_empty() {
        assert_eq!(compute_balance(&[]), 0);
    }

    #[test]
    fn test_compute_balance_skips_reversed() {
        let mut purchase = entry(TransactionType::Purchased, 250, 250);
        let mut refund = entry(TransactionType::Refund, -250, 0);
        let bonus = entry(TransactionType::Bonus, 10, 10);
        purchase.status = TransactionStatus::Reversed;
        refund.status = TransactionStatus::Reversed;

        assert_eq!(compute_balance(&[purchase, refund, bonus]), 10);
    }

    #[test]
    fn test_capped_debit() {
        assert_eq!(
            capped_debit(180, 250),
            CappedDebit {
                applied: -180,
                shortfall: 70
            }
        );
        assert_eq!(
            capped_debit(300, 250),
            CappedDebit {
                applied: -250,
                shortfall: 0
            }
        );
        assert_eq!(
            capped_debit(0, 250),
            CappedDebit {
                applied: 0,
                shortfall: 250
            }
        );
    }

    #[test]
    fn test_capped_debit_extremes() {
        assert_eq!(
            capped_debit(i64::MAX, i64::MAX),
            CappedDebit {
                applied: -i64::MAX,
                shortfall: 0
            }
        );
        assert_eq!(
            capped_debit(10, i64::MIN),
            CappedDebit {
                applied: 0,
                shortfall: 0
            }
        );
    }

    #[test]
    fn test_check_account_clean() {
        let txns = vec![
            entry(TransactionType::Purchased, 250, 250),
            entry(TransactionType::Spent, -20, 230),
            entry(TransactionType::Adjustment, -50, 180),
        ];
        assert!(check_account(&account(180), &txns).is_empty());
    }

    #[test]
    fn test_check_account_detects_mismatch() {
        let txns = vec![entry(TransactionType::Purchased, 250, 250)];
        let issues = check_account(&account(300), &txns);
        assert_eq!(
            issues,
            vec![IntegrityIssue::BalanceMismatch {
                account_id: "acct".into(),
                stored: 300,
                computed: 250
            }]
        );
    }

    #[test]
    fn test_check_account_detects_broken_chain() {
        let txns = vec![
            entry(TransactionType::Purchased, 250, 250),
            entry(TransactionType::Spent, -20, 200),
            entry(TransactionType::Spent, -10, 190),
        ];
        let issues = check_account(&account(220), &txns);
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            issues[0],
            IntegrityIssue::BrokenChain {
                expected: 230,
                recorded: 200,
                ..
            }
        ));
    }
}
