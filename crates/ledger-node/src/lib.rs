//! Peer-to-peer ledger node: TCP listener, broadcast and message handling
//! around a [`ledger_core::Chain`] and a registry of escrow contracts.

pub mod api;
pub mod config;
mod constants;
pub mod error;
pub mod message;
pub mod node;
pub mod observer;
pub mod transport;

pub use config::NodeConfig;
pub use constants::MAX_FRAME_LEN;
pub use error::{NodeError, NodeResult, WireError};
pub use message::{BlockPayload, ContractActionPayload, Message};
pub use node::{Node, RunningNode};
pub use observer::{ChainObserver, ChainSnapshot, LogObserver};
