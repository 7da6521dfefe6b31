/// Maximum message title length in characters (after trimming).
pub const MAX_TITLE_LEN: usize = 100;

/// Maximum message content length in characters (after trimming).
pub const MAX_CONTENT_LEN: usize = 500;

/// Default capacity of the board event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Account / contract address size in bytes (EVM-style).
pub const ADDRESS_SIZE: usize = 20;

/// Ciphertext handle size in bytes (bytes32 on the ledger).
pub const HANDLE_SIZE: usize = 32;
