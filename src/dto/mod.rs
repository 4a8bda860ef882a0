//! Wire-visible data types: broadcast events, presence records, and results.

pub mod events;
pub mod presence;
pub mod question;
pub mod results;
