pub mod candle;
pub mod session;
pub mod tick;
pub mod timeframe;

pub use candle::Candle;
pub use session::SessionClock;
pub use tick::Tick;
pub use timeframe::{Timeframe, TimeframeUnit, parse_timeframes};
