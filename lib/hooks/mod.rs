//! Callbacks the emulator invokes while a guest runs.
//!
//! There are two kinds. A fault hook is consulted whenever the guest touches
//! memory it may not, and decides whether execution resumes. A function
//! replacement intercepts execution at an address, runs host code in place
//! of the guest function, and returns to the caller.

pub(crate) mod fault;
pub(crate) mod replace;

pub use self::fault::{log_invalid_access, FaultEvent, FaultKind, LocatedFault};
pub use self::replace::{CallingConvention, ReturnAddress};
