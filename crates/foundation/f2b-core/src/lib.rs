//! f2b-core: shared data model for the fail2ban dashboard
//!
//! ```text
//! fail2ban-client ──► f2b-exec ──► f2b-parse ──┐
//!                                              ├──► f2b-stats ──► f2b-web
//!                          f2b-demo ───────────┘
//!                                   f2b-actionlog ◄── ban/unban
//! ```
//!
//! Everything that crosses a crate boundary lives here: jails, banned
//! addresses, action log entries, the aggregated status snapshot, and the
//! validation rules for request parameters.

pub mod model;
pub mod validate;

pub use model::{
    ActionKind, ActionLogEntry, BannedAddress, Jail, Mode, Offender, Outcome, StatusSnapshot,
    TimelineBucket, Totals,
};
pub use validate::{validate_address, validate_jail_name, ValidationError};
