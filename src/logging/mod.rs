//! Persistent search progress logs for offline analysis.
//!
//! # File Formats
//!
//! Individual logs are CSV files with one row per evaluated deck:
//!
//! ```text
//! Individual,Parent,WinCount,...,NumSpellCards,S0:WinCount,S0:Alignment,...,Deck
//! 17,4,12,3.5,...,9,6,0.75,...,Fireball*Fireball*Frostbolt*...
//! ```
//!
//! Missing IDs are written as `-1`. The header is derived from the first
//! individual logged, so every row of a file has the same strategy count.
//!
//! Map logs hold one compressed archive snapshot per row:
//!
//! ```text
//! Dimensions,Map (f1xf2:CellCount:IndividualID:Wins:Fitness:Feature1:Feature2)
//! 20x20,3:7:2:41:12:3.5:38:2.1,...
//! ```

mod individual_log;
mod map_log;

pub use individual_log::{IndividualLog, SearchLogs};
pub use map_log::MapLog;
