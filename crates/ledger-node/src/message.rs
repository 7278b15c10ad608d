//! Wire envelope exchanged between nodes.
//!
//! Every frame is a JSON object `{"kind": ..., "payload": ...}`. Decoding reads
//! the envelope first and only then the payload for a known kind, so an
//! unexpected kind can be told apart from a corrupt frame.

use crate::error::WireError;
use ledger_core::{Block, ContractAction, EscrowContract, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const KIND_TRANSACTION: &str = "transaction";
pub const KIND_BLOCK: &str = "block";
pub const KIND_CONTRACT_ACTION: &str = "contractAction";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    pub block: Block,
    /// Proof hash claimed by the miner.
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractActionPayload {
    /// The action that produced `contract`'s state.
    pub action: ContractAction,
    pub contract_id: String,
    pub contract: EscrowContract,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum Message {
    Transaction(Transaction),
    Block(BlockPayload),
    ContractAction(ContractActionPayload),
}

#[derive(Deserialize)]
struct Envelope {
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Transaction(_) => KIND_TRANSACTION,
            Message::Block(_) => KIND_BLOCK,
            Message::ContractAction(_) => KIND_CONTRACT_ACTION,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let Envelope { kind, payload } = serde_json::from_slice(bytes)?;
        let message = match kind.as_str() {
            KIND_TRANSACTION => Message::Transaction(serde_json::from_value(payload)?),
            KIND_BLOCK => Message::Block(serde_json::from_value(payload)?),
            KIND_CONTRACT_ACTION => {
                let payload: ContractActionPayload = serde_json::from_value(payload)?;
                if payload.contract_id != payload.contract.id {
                    return Err(WireError::ContractIdMismatch {
                        contract_id: payload.contract_id,
                        snapshot_id: payload.contract.id,
                    });
                }
                Message::ContractAction(payload)
            }
            _ => return Err(WireError::UnknownKind(kind)),
        };
        Ok(message)
    }
}
