use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Action a party can take on an escrow contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractAction {
    Confirm,
    Dispute,
    Refund,
}

impl ContractAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractAction::Confirm => "confirm",
            ContractAction::Dispute => "dispute",
            ContractAction::Refund => "refund",
        }
    }
}

impl fmt::Display for ContractAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirm" => Ok(ContractAction::Confirm),
            "dispute" => Ok(ContractAction::Dispute),
            "refund" => Ok(ContractAction::Refund),
            other => Err(format!("unknown contract action: {other}")),
        }
    }
}

/// State derived from the `released`/`disputed` flags.
///
/// A refund is an observation on a disputed contract, not a stored state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractState {
    Active,
    Disputed,
    Released,
}

/// Result descriptor returned by every contract operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractOutcome {
    pub message: String,
    pub contract_id: String,
    /// The action was allowed in the contract's state.
    pub accepted: bool,
    /// The contract's fields differ from before the action.
    pub changed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowContract {
    pub id: String,
    pub buyer: String,
    pub seller: String,
    pub amount: u64,
    pub released: bool,
    pub disputed: bool,
}

impl EscrowContract {
    /// Open an active contract under a fresh v4 UUID.
    pub fn new(buyer: impl Into<String>, seller: impl Into<String>, amount: u64) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), buyer, seller, amount)
    }

    pub fn with_id(
        id: impl Into<String>,
        buyer: impl Into<String>,
        seller: impl Into<String>,
        amount: u64,
    ) -> Self {
        Self {
            id: id.into(),
            buyer: buyer.into(),
            seller: seller.into(),
            amount,
            released: false,
            disputed: false,
        }
    }

    pub fn state(&self) -> ContractState {
        if self.released {
            ContractState::Released
        } else if self.disputed {
            ContractState::Disputed
        } else {
            ContractState::Active
        }
    }

    /// Release funds to the seller unless a dispute is open.
    pub fn confirm_delivery(&mut self) -> ContractOutcome {
        if self.disputed {
            return self.rejected(format!(
                "Delivery confirmation rejected: contract is disputed, funds ({}) stay held.",
                self.amount
            ));
        }
        let changed = !self.released;
        self.released = true;
        self.outcome(
            format!("Funds ({}) released to {}.", self.amount, self.seller),
            changed,
        )
    }

    pub fn raise_dispute(&mut self) -> ContractOutcome {
        if self.released {
            return self.rejected(format!(
                "Dispute rejected: funds ({}) were already released to {}.",
                self.amount, self.seller
            ));
        }
        let changed = !self.disputed;
        self.disputed = true;
        self.outcome(
            format!("Dispute raised. Funds ({}) held.", self.amount),
            changed,
        )
    }

    pub fn refund_buyer(&mut self) -> ContractOutcome {
        if self.disputed && !self.released {
            self.outcome(
                format!("Funds ({}) refunded to {}.", self.amount, self.buyer),
                false,
            )
        } else {
            self.rejected(format!(
                "Refund rejected: contract must be disputed and unreleased, funds ({}) unchanged.",
                self.amount
            ))
        }
    }

    pub fn apply(&mut self, action: ContractAction) -> ContractOutcome {
        match action {
            ContractAction::Confirm => self.confirm_delivery(),
            ContractAction::Dispute => self.raise_dispute(),
            ContractAction::Refund => self.refund_buyer(),
        }
    }

    fn outcome(&self, message: String, changed: bool) -> ContractOutcome {
        ContractOutcome {
            message,
            contract_id: self.id.clone(),
            accepted: true,
            changed,
        }
    }

    fn rejected(&self, message: String) -> ContractOutcome {
        ContractOutcome {
            message,
            contract_id: self.id.clone(),
            accepted: false,
            changed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_releases_active_contract() {
        let mut c = EscrowContract::new("Alice", "Bob", 100);
        let out = c.confirm_delivery();
        assert!(out.accepted && out.changed);
        assert_eq!(out.contract_id, c.id);
        assert_eq!(out.message, "Funds (100) released to Bob.");
        assert!(c.released);
        assert_eq!(c.state(), ContractState::Released);
    }

    #[test]
    fn dispute_blocks_confirm_then_refund_succeeds() {
        let mut c = EscrowContract::new("Alice", "Bob", 100);
        assert!(c.raise_dispute().accepted);

        let out = c.confirm_delivery();
        assert!(!out.accepted);
        assert!(!c.released);

        let refund = c.refund_buyer();
        assert!(refund.accepted);
        assert_eq!(refund.message, "Funds (100) refunded to Alice.");
        assert!(!c.released);
        assert_eq!(c.state(), ContractState::Disputed);
    }

    #[test]
    fn refund_without_dispute_is_rejected() {
        let mut c = EscrowContract::new("Alice", "Bob", 100);
        let out = c.refund_buyer();
        assert!(!out.accepted);
        assert_eq!(c.state(), ContractState::Active);
    }

    #[test]
    fn dispute_is_idempotent() {
        let mut c = EscrowContract::new("Charlie", "Dave", 50);
        assert!(c.raise_dispute().changed);
        let again = c.raise_dispute();
        assert!(again.accepted);
        assert!(!again.changed);
        assert!(c.disputed);
    }

    #[test]
    fn released_contract_is_terminal() {
        let mut c = EscrowContract::new("Alice", "Bob", 100);
        c.confirm_delivery();
        let before = c.clone();
        assert!(!c.raise_dispute().accepted);
        assert!(!c.refund_buyer().accepted);
        assert!(!c.confirm_delivery().changed);
        assert_eq!(c, before);
    }

    #[test]
    fn apply_routes_actions() {
        let mut c = EscrowContract::with_id("c-1", "Alice", "Bob", 10);
        assert!(c.apply(ContractAction::Dispute).accepted);
        assert!(!c.apply(ContractAction::Confirm).accepted);
        assert!(c.apply(ContractAction::Refund).accepted);
    }

    #[test]
    fn action_wire_names() {
        for action in [
            ContractAction::Confirm,
            ContractAction::Dispute,
            ContractAction::Refund,
        ] {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
            assert_eq!(action.as_str().parse::<ContractAction>().unwrap(), action);
        }
        assert!("release".parse::<ContractAction>().is_err());
    }

    #[test]
    fn contract_ids_are_unique() {
        let a = EscrowContract::new("Alice", "Bob", 1);
        let b = EscrowContract::new("Alice", "Bob", 1);
        assert_ne!(a.id, b.id);
    }
}
