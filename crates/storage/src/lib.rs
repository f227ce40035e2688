#![forbid(unsafe_code)]

mod db;
mod entry;
mod reaper;

pub use db::Db;
pub use entry::{Ttl, ValueKind};
pub use reaper::Reaper;
