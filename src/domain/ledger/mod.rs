pub mod fifo;
pub mod occ;
pub mod trade;

pub use fifo::{
    AsOf, ClosedPosition, FillAttribution, GroupKey, GroupPnl, Lot, PnlReport, StrategyKey,
    StrategyPnl, aggregate_by_strategy, compute_fifo_pnl,
};
pub use occ::{OccContract, OptionRight, infer_multiplier, parse_occ_symbol};
pub use trade::{LedgerTrade, Side};
