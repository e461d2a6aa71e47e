//! Equity calculator.
//!
//! Isolated positions are backed only by their locked margin. Cross positions
//! share the account balance, so their equity is account-wide.

use crate::types::{MarginMode, Quote};

/// Locked margin + position pnl - fees accrued on the position.
pub fn isolated_equity(locked_initial_margin: Quote, position_pnl: Quote, fees_accrued: Quote) -> Quote {
    locked_initial_margin.add(position_pnl).sub(fees_accrued)
}

/// Account balance + pnl of every open cross position - their fees.
pub fn cross_equity<P, F>(account_balance: Quote, pnls: P, fees: F) -> Quote
where
    P: IntoIterator<Item = Quote>,
    F: IntoIterator<Item = Quote>,
{
    let pnl_sum: Quote = pnls.into_iter().sum();
    let fee_sum: Quote = fees.into_iter().sum();
    account_balance.add(pnl_sum).sub(fee_sum)
}

/// One open position's contribution to a cross equity figure.
#[derive(Debug, Clone, Copy)]
pub struct CrossLeg {
    pub pnl: Quote,
    pub fees_accrued: Quote,
}

/// Inputs for an equity figure under either mode.
#[derive(Debug, Clone)]
pub enum EquityBasis {
    Isolated {
        locked_initial_margin: Quote,
        pnl: Quote,
        fees_accrued: Quote,
    },
    Cross {
        account_balance: Quote,
        legs: Vec<CrossLeg>,
    },
}

impl EquityBasis {
    pub fn mode(&self) -> MarginMode {
        match self {
            EquityBasis::Isolated { .. } => MarginMode::Isolated,
            EquityBasis::Cross { .. } => MarginMode::Cross,
        }
    }

    pub fn equity(&self) -> Quote {
        match self {
            EquityBasis::Isolated {
                locked_initial_margin,
                pnl,
                fees_accrued,
            } => isolated_equity(*locked_initial_margin, *pnl, *fees_accrued),
            EquityBasis::Cross {
                account_balance,
                legs,
            } => cross_equity(
                *account_balance,
                legs.iter().map(|l| l.pnl),
                legs.iter().map(|l| l.fees_accrued),
            ),
        }
    }
}
