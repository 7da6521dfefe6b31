//! Client configuration.

use serde::{Deserialize, Serialize};

use chiffre_shared::constants::DEFAULT_EVENT_CAPACITY;
use chiffre_shared::types::Address;

/// Configuration for a [`BoardClient`](crate::board::BoardClient).
///
/// One client instance serves one deployed message board contract; a chain
/// or contract change means building a fresh client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Address of the message board contract.
    pub contract: Address,

    /// Capacity of the board event broadcast channel. Slow subscribers that
    /// fall further behind than this lag.
    pub event_capacity: usize,
}

impl ClientConfig {
    pub fn new(contract: Address) -> Self {
        Self {
            contract,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
