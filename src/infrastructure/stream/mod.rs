pub mod alpaca_websocket;

pub use alpaca_websocket::{AlpacaStreamManager, ConnectionState, StreamConfig};
