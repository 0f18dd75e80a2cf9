pub const BYTES_PER_MB: u64 = 1024 * 1024;
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Bytes per second carried by one megabit per second of bandwidth.
pub const BYTES_PER_MBIT: f64 = 125_000.0;

pub const DEFAULT_CHUNK_SIZE: u64 = BYTES_PER_MB;

/// Smallest chunk size a file may announce.
pub const MIN_CHUNK_SIZE: u64 = 4 * 1024;

/// Bandwidth assumed for a requester the coordinator has never seen.
pub const DEFAULT_REQUESTER_BANDWIDTH_MBPS: u32 = 100;

pub const DEFAULT_COORDINATOR_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_ADMIN_ADDR: &str = "127.0.0.1:5080";

pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

pub const PACKET_HEADER_SIZE: usize = 128;
pub const MAX_PACKET_PAYLOAD: usize = 64 * 1024;
pub const PACKET_ID_LEN: usize = 32;
