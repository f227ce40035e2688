#![forbid(unsafe_code)]

mod error;

pub use error::*;

pub const DEFAULT_PORT: u16 = 6410;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const MAX_CONNECTIONS: usize = 1024;
pub const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024; // 4 KB
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024; // 64 MB
/// Níveis máximos de arrays aninhados num frame.
pub const MAX_FRAME_DEPTH: usize = 32;

/// Intervalo padrão da varredura ativa de chaves expiradas (5 minutos).
pub const DEFAULT_REAPER_INTERVAL_MS: u64 = 5 * 60 * 1000;
