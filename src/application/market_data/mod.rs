pub mod candle_aggregator;
pub mod tick_filter;

pub use candle_aggregator::{
    AggregatorConfig, AggregatorCounters, AggregatorSnapshot, CandleAggregator,
};
pub use tick_filter::{FilterDecision, PriceClamp, TickFilter, TickFilterConfig};
