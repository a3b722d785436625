//! Deck Search - Distributed MAP-Elites over card decks.
//!
//! Candidate decks are evaluated by external worker processes that play
//! matches with them. This crate coordinates those workers and keeps the
//! quality-diversity archive of the best deck found for each region of
//! behaviour space.
//!
//! # Architecture
//!
//! - `schema`: Configuration, individuals and mailbox messages
//! - `search`: The feature map archive and search algorithms
//! - `coordinator`: Worker mailboxes, the worker pool and run loops
//! - `logging`: CSV logs of evaluations and archive snapshots
//!
//! # Example
//!
//! ```rust,no_run
//! use deck_search::{
//!     coordinator::{DistributedSearch, FileMailbox},
//!     schema::SearchConfig,
//! };
//!
//! let config = SearchConfig::default();
//! let mailbox = FileMailbox::create(&config.coordinator.mailbox_dir).unwrap();
//!
//! let mut search = DistributedSearch::from_config(&config, "search.json", mailbox).unwrap();
//! search.run().unwrap();
//!
//! println!("Elites found: {}", search.algorithm().all_elites().len());
//! ```

pub mod coordinator;
pub mod logging;
pub mod schema;
pub mod search;

// Re-export commonly used types
pub use coordinator::{DistributedSearch, FileMailbox, Mailbox, SurrogatedSearch};
pub use schema::{Individual, SearchConfig};
pub use search::{FeatureMap, SearchAlgorithm, SearchError};
