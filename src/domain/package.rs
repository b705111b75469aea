use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountRole, Credits};

pub type PackageId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Teacher,
    Guardian,
    Both,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Teacher => "teacher",
            Audience::Guardian => "guardian",
            Audience::Both => "both",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "teacher" => Some(Audience::Teacher),
            "guardian" => Some(Audience::Guardian),
            "both" => Some(Audience::Both),
            _ => None,
        }
    }

    /// Whether an account with this role may buy a package aimed at this audience.
    pub fn includes(&self, role: AccountRole) -> bool {
        match self {
            Audience::Both => true,
            Audience::Teacher => role == AccountRole::Teacher,
            Audience::Guardian => role == AccountRole::Guardian,
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Longest subscription a single package may grant (ten years).
pub const MAX_VALIDITY_DAYS: u32 = 3650;

/// Editable fields of a package, as supplied by an administrator.
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub name: String,
    pub base_credits: Credits,
    pub bonus_credits: Credits,
    pub price: Credits,
    pub audience: Audience,
    /// Subscription length granted on settlement, if this is a plan
    pub validity_days: Option<u32>,
}

impl PackageSpec {
    pub fn new(
        name: impl Into<String>,
        base_credits: Credits,
        bonus_credits: Credits,
        price: Credits,
        audience: Audience,
    ) -> Self {
        Self {
            name: name.into(),
            base_credits,
            bonus_credits,
            price,
            audience,
            validity_days: None,
        }
    }

    pub fn with_validity_days(mut self, days: u32) -> Self {
        self.validity_days = Some(days);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("package name must not be empty".to_string());
        }
        if self.base_credits <= 0 {
            return Err(format!(
                "base credits must be positive, got {}",
                self.base_credits
            ));
        }
        if self.bonus_credits < 0 {
            return Err(format!(
                "bonus credits must not be negative, got {}",
                self.bonus_credits
            ));
        }
        if self.base_credits.checked_add(self.bonus_credits).is_none() {
            return Err(format!(
                "base credits {} plus bonus credits {} are out of range",
                self.base_credits, self.bonus_credits
            ));
        }
        if self.price < 0 {
            return Err(format!("price must not be negative, got {}", self.price));
        }
        match self.validity_days {
            Some(0) => return Err("validity days must be positive when set".to_string()),
            Some(days) if days > MAX_VALIDITY_DAYS => {
                return Err(format!(
                    "validity days must be at most {}, got {}",
                    MAX_VALIDITY_DAYS, days
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub base_credits: Credits,
    pub bonus_credits: Credits,
    pub price: Credits,
    pub audience: Audience,
    pub active: bool,
    pub validity_days: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Package {
    /// Build a new, active package. The spec must already be validated.
    pub fn from_spec(spec: PackageSpec) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: spec.name,
            base_credits: spec.base_credits,
            bonus_credits: spec.bonus_credits,
            price: spec.price,
            audience: spec.audience,
            active: true,
            validity_days: spec.validity_days,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, spec: PackageSpec) {
        self.name = spec.name;
        self.base_credits = spec.base_credits;
        self.bonus_credits = spec.bonus_credits;
        self.price = spec.price;
        self.audience = spec.audience;
        self.validity_days = spec.validity_days;
        self.updated_at = Utc::now();
    }

    /// Credits granted when a purchase of this package settles.
    /// Saturates for packages that never went through `PackageSpec::validate`.
    pub fn total_credits(&self) -> Credits {
        self.base_credits.saturating_add(self.bonus_credits)
    }

    pub fn is_available_to(&self, role: AccountRole) -> bool {
        self.active && self.audience.includes(role)
    }
}
