// Stat model: typed counting records, rate derivation, box-score extraction.

pub mod counts;
pub mod extract;
pub mod rates;
