//! Queue job handlers for the two worker pools.
//!
//! The submission pool drives compile -> estimate -> submit for each
//! deployment job; the confirmation pool polls for receipts and finalizes
//! records. The pools are independent so a stalled chain RPC cannot starve
//! receipt polling, and vice versa.

pub mod confirmation;
pub mod deploy;
