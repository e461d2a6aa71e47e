// 8.0: position mutation orchestrator. every mutation resolves its mark price first,
// previews the new risk, then validates and commits inside one unit of work.
// no I/O of its own: ledger, prices, symbols and time are all injected.

mod close;
mod core;
mod dispatch;
mod leverage;
mod mode;
mod protection;
mod queries;
mod results;

#[cfg(test)]
mod test_support;

pub use crate::config::EngineConfig;
pub use core::{Engine, RequestContext};
pub use results::{
    ClosePositionResult, EngineError, PositionRisk, ProtectionResult, SetLeverageResult,
    SetModeResult,
};
