// margin-core: margin and position-risk engine for a leveraged-trading back office.
// formulas first, then previews, then atomic mutations over the account ledger.
// all money is Decimal. prices, symbols, storage and time are injected.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: ids, Side, MarginMode, Price, Quote, Leverage, Timestamp
//   3.x  margin.rs: formula library: notional, IM, MM, pnl, ROE, liquidation estimate
//   3.5x preview.rs: risk preview over a symbol's parameters
//   3.8x equity.rs: isolated and cross equity
//   4.x  position.rs: position record, cached risk, lifecycle
//   7.x  config.rs: buffers, fees, precision, price feed, ledger timeouts, presets
//   8.x  engine/: orchestrator: close, leverage, mode, protection, queries, dispatch
//   9.x  price_feed.rs: mark price source, staleness cache
//   9.5  clock.rs: injected time
//   10.x account.rs: trading account ledger fields
//   10.1 ledger.rs: unit of work, in-memory account books, audit log
//   11.x events.rs: audit entries, one typed event per mutation
//   12.x symbol.rs: symbol risk params + catalog
//   13.x api.rs: requests, commands, error codes, response envelope

// core modules
pub mod account;
pub mod engine;
pub mod equity;
pub mod events;
pub mod margin;
pub mod position;
pub mod preview;
pub mod symbol;
pub mod types;

// storage and collaborators
pub mod clock;
pub mod ledger;
pub mod price_feed;

// integration modules
pub mod api;
pub mod config;

// re exports for convenience
pub use account::*;
pub use engine::*;
pub use equity::*;
pub use events::*;
pub use margin::*;
pub use position::*;
pub use preview::{preview, PreviewInput, RiskPreview};
pub use symbol::*;
pub use types::*;
pub use api::{
    ApiError, ApiResponse, ClosePositionRequest, CommandOutcome, EngineCommand, ErrorCode,
    SetLeverageRequest, SetMarginModeRequest, UpdateProtectionRequest,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    ConfigError, Environment, FeeConfig, LedgerConfig, PrecisionConfig, PriceFeedConfig,
};
pub use ledger::{InMemoryLedger, LedgerError, Transaction, TxScope, UnitOfWork};
pub use price_feed::{FixedPrices, MarkPriceSource, PriceCache, PriceUpdate};
