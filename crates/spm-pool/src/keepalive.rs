//! Keep-alive pacing for idle connections
//!
//! Servers drop connections that stay idle too long. Once per pool, a pacer
//! task borrows some idle connection, runs a trivial statement on it and
//! sleeps. How long it sleeps adapts to load: every re-pacing interval (an
//! hour by default) a [`PacingPolicy`] maps the number of checkouts since
//! the counter was last reset to a ping interval. The quieter the pool, the
//! more often it pings. The state starts over when the calendar day changes.
//!
//! # Example
//!
//! ```ignore
//! use spm_pool::keepalive::{BracketPolicy, PacingPolicy, LoadBracket};
//!
//! let policy = BracketPolicy::default();
//! let decision = policy.decide(1, 10);
//! assert_eq!(decision.bracket, LoadBracket::VeryLow);
//! ```

mod pacer;
mod ping;
mod policy;


pub(crate) use pacer::spawn;
pub use pacer::PacerState;
pub use ping::ping;
pub use policy::{BracketPolicy, LoadBracket, PacingDecision, PacingPolicy};
