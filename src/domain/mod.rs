//! Domain types shared by the engine, storage and jobs.

mod accrual_request;
mod customer;
mod ledger;
mod membership;

pub use accrual_request::{AccrualRequest, RequestStatus, Review, TicketClaim};
pub use customer::{Customer, MemberTier};
pub use ledger::{LedgerKind, MilesLedgerEntry};
pub use membership::{MembershipHistory, TierChangeReason};

/// Role carried by administrators in the identity context.
pub const ADMIN_ROLE: &str = "admin";

/// Canonical form of a location code: trimmed, ASCII uppercase.
pub fn location_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Known distance between two location codes. Lookups are symmetric.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelDistance {
    pub from_code: String,
    pub to_code: String,
    pub miles: u32,
}

impl TravelDistance {
    pub fn new(from_code: impl AsRef<str>, to_code: impl AsRef<str>, miles: u32) -> Self {
        Self {
            from_code: location_code(from_code.as_ref()),
            to_code: location_code(to_code.as_ref()),
            miles,
        }
    }

    /// Same route with both codes in canonical form.
    pub fn normalized(&self) -> Self {
        Self::new(&self.from_code, &self.to_code, self.miles)
    }

    /// True when this route joins `a` and `b` in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from_code == a && self.to_code == b) || (self.from_code == b && self.to_code == a)
    }
}

/// The acting user, as supplied by the identity context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub external_id: String,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            roles: Vec::new(),
        }
    }

    pub fn admin(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            roles: vec![ADMIN_ROLE.to_string()],
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}
