//! BSA Core - Deterministic State Authority
//!
//! Single-writer authority over a canonical key-value state:
//! - Validates change proposals from external agents
//! - Durably stages them on disk, one entry per intent id
//! - Periodically reconciles staged proposals into canonical state
//! - Serves detached snapshots of canonical state
//!
//! # Example
//!
//! ```rust,no_run
//! use bsa_core::{Proposal, Reconciler, StateAuthority};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authority = Arc::new(StateAuthority::open("./data"));
//! let reconciler = Reconciler::new(Arc::clone(&authority)).spawn();
//!
//! authority.propose_change(&Proposal::new("abc", "x=1"))?;
//!
//! // ...after at least one reconciliation interval
//! let state = authority.get_state(None);
//! println!("{:?}", state.get("abc"));
//!
//! reconciler.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod authority;
pub mod config;
pub mod error;
pub mod proposal;
pub mod reconcile;
pub mod staging;
pub mod store;

pub use authority::{PassReport, StateAuthority};
pub use config::AuthorityConfig;
pub use error::{AuthorityError, ProposalError, StagingError};
pub use proposal::{Proposal, ProposalValidator};
pub use reconcile::{Reconciler, ReconcilerHandle};
pub use staging::{Drain, EntryHandle, StagingQueue};
pub use store::{CanonicalState, StateStore, StateWriter, APPLIED, LAST_PROCESSED_INTENT};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the authority
    pub use crate::{
        AuthorityConfig, CanonicalState, Proposal, Reconciler, ReconcilerHandle,
        StateAuthority,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
