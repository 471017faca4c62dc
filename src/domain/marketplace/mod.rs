pub mod fees;
pub mod performance;

pub use fees::{
    FeeBasis, FeeSplit, RevenueShareTerm, compute_fee_from_bps, compute_performance_fee,
    split_fee_amount,
};
pub use performance::{PeriodPnl, attribute_period_pnl, month_period_utc, monthly_snapshot_id};
