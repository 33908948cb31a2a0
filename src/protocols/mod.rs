/*
 * Per-protocol position readers for the three AMM generations
 */

pub mod v2;
pub mod v3;
pub mod v4;

pub use v2::V2Reader;
pub use v3::V3Reader;
pub use v4::{IndexerClient, PoolKey, V4Reader};
