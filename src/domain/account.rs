use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{Credits, PackageId};

/// Accounts are keyed by the marketplace user id.
pub type AccountId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    /// Tutors: earn credits and spend them on applications
    Teacher,
    /// Parents or guardians posting tuition requests
    Guardian,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountRole::Teacher => "teacher",
            AccountRole::Guardian => "guardian",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "teacher" | "tutor" => Some(AccountRole::Teacher),
            "guardian" | "parent" => Some(AccountRole::Guardian),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Credit account of one user. `balance` is a derived view maintained by the ledger store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub role: AccountRole,
    pub balance: Credits,
    pub subscription_plan_id: Option<PackageId>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(id: impl Into<AccountId>, role: AccountRole) -> Self {
        Self {
            id: id.into(),
            role,
            balance: 0,
            subscription_plan_id: None,
            subscription_expires_at: None,
            active: true,
            created_at: Utc::now(),
            deactivated_at: None,
        }
    }

    pub fn has_active_subscription(&self, now: DateTime<Utc>) -> bool {
        matches!(self.subscription_expires_at, Some(expires) if expires > now)
    }
}

/// Subscription time granted by a settled purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionGrant {
    pub plan_id: PackageId,
    pub validity_days: u32,
}

/// Compute the new subscription expiry after a grant.
/// Renewing the same, still running plan stacks on top of the current expiry;
/// anything else starts from `now`. `None` when the expiry is not representable.
pub fn extend_subscription(
    current_plan: Option<PackageId>,
    current_expiry: Option<DateTime<Utc>>,
    grant: SubscriptionGrant,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let start = match (current_plan, current_expiry) {
        (Some(plan), Some(expiry)) if plan == grant.plan_id && expiry > now => expiry,
        _ => now,
    };
    Duration::try_days(i64::from(grant.validity_days))
        .and_then(|days| start.checked_add_signed(days))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in [AccountRole::Teacher, AccountRole::Guardian] {
            assert_eq!(AccountRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(AccountRole::from_str("Tutor"), Some(AccountRole::Teacher));
        assert_eq!(AccountRole::from_str("donor"), None);
    }

    #[test]
    fn test_new_account_starts_empty() {
        let account = Account::new("u-1", AccountRole::Guardian);
        assert_eq!(account.balance, 0);
        assert!(account.active);
        assert!(!account.has_active_subscription(Utc::now()));
    }

    #[test]
    fn test_extend_subscription_fresh() {
        let now = Utc::now();
        let plan = Uuid::new_v4();
        let grant = SubscriptionGrant {
            plan_id: plan,
            validity_days: 30,
        };
        assert_eq!(
            extend_subscription(None, None, grant, now),
            Some(now + Duration::days(30))
        );
    }

    #[test]
    fn test_extend_subscription_stacks_same_plan() {
        let now = Utc::now();
        let plan = Uuid::new_v4();
        let expiry = now + Duration::days(10);
        let grant = SubscriptionGrant {
            plan_id: plan,
            validity_days: 30,
        };
        assert_eq!(
            extend_subscription(Some(plan), Some(expiry), grant, now),
            Some(expiry + Duration::days(30))
        );
    }

    #[test]
    fn test_extend_subscription_out_of_range() {
        let grant = SubscriptionGrant {
            plan_id: Uuid::new_v4(),
            validity_days: u32::MAX,
        };
        assert_eq!(extend_subscription(None, None, grant, Utc::now()), None);
    }

    #[test]
    fn test_extend_subscription_switching_plan_restarts() {
        let now = Utc::now();
        let grant = SubscriptionGrant {
            plan_id: Uuid::new_v4(),
            validity_days: 7,
        };
        let other_expiry = now + Duration::days(20);
        assert_eq!(
            extend_subscription(Some(Uuid::new_v4()), Some(other_expiry), grant, now),
            Some(now + Duration::days(7))
        );
    }

    #[test]
    fn test_extend_subscription_expired_plan_restarts() {
        let now = Utc::now();
        let plan = Uuid::new_v4();
        let grant = SubscriptionGrant {
            plan_id: plan,
            validity_days: 7,
        };
        let expired = now - Duration::days(1);
        assert_eq!(
            extend_subscription(Some(plan), Some(expired), grant, now),
            Some(now + Duration::days(7))
        );
    }
}
