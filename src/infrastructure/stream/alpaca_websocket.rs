//! Persistent WebSocket connection manager for the broker trade stream.
//!
//! One connection per process; subscribers fan out over a broadcast
//! channel and subscription changes go through a command channel instead
//! of reconnecting. Reconnects use exponential backoff with full jitter
//! (base 1s, cap 60s); the attempt counter resets on the first event after
//! a connect, and exceeding the retry window surfaces a fatal error for
//! the supervisor.

use crate::application::ingest::Backoff;
use crate::application::monitoring::StreamHealthMonitor;
use crate::domain::market::Tick;
use crate::domain::time::parse_rfc3339_utc;
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, broadcast, mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{error, info, warn};

const COMPONENT: &str = "marketdata-ingest";
const STREAM: &str = "trades";

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Authenticated,
    Subscribed,
    /// Retry window exhausted; the supervisor must restart the process.
    Failed,
}

#[derive(Debug)]
enum SubscriptionCommand {
    UpdateSymbols(Vec<String>),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub ws_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub symbols: Vec<String>,
    pub read_deadline_seconds: u64,
    /// How long the subscribed stream may go without a trade before it is
    /// treated as a zombie and reconnected. Control frames keep the socket
    /// alive, so the read deadline alone cannot catch this.
    pub silence_threshold_seconds: u64,
    pub backoff_base_seconds: f64,
    pub backoff_max_seconds: f64,
    pub max_retry_window_seconds: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
enum BrokerMessage {
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error { code: i32, msg: String },
    #[serde(rename = "subscription")]
    Subscription { trades: Option<Vec<String>> },
    #[serde(rename = "t")]
    Trade(BrokerTrade),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct BrokerTrade {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "p")]
    price: f64,
    #[serde(rename = "s")]
    size: f64,
    #[serde(rename = "t")]
    timestamp: String,
}

impl BrokerTrade {
    fn to_tick(&self) -> Result<Tick> {
        let ts = parse_rfc3339_utc(&self.timestamp)?;
        // Broker floats arrive as text on the wire; go through the string
        // form so ledger-grade decimals stay exact.
        let price = Decimal::from_str(&self.price.to_string()).context("trade price")?;
        let size = Decimal::from_str(&self.size.to_string()).context("trade size")?;
        Ok(Tick::new(&self.symbol, ts, price, size)?)
    }
}

pub struct AlpacaStreamManager {
    config: StreamConfig,
    event_tx: broadcast::Sender<Tick>,
    command_tx: mpsc::Sender<SubscriptionCommand>,
    state: Arc<RwLock<ConnectionState>>,
    fatal_rx: watch::Receiver<Option<String>>,
}

impl AlpacaStreamManager {
    /// Create the manager and start the background connection task.
    pub fn new(config: StreamConfig, metrics: Arc<Metrics>) -> Self {
        let (event_tx, _) = broadcast::channel(4096);
        let (command_tx, command_rx) = mpsc::channel(10);
        let (fatal_tx, fatal_rx) = watch::channel(None);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let manager = Self {
            config: config.clone(),
            event_tx: event_tx.clone(),
            command_tx,
            state: state.clone(),
            fatal_rx,
        };
        tokio::spawn(Self::connection_task(
            config, event_tx, state, command_rx, fatal_tx, metrics,
        ));
        manager
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Tick> {
        self.event_tx.subscribe()
    }

    /// Watch for a fatal connection failure (retry window exceeded).
    pub fn fatal_errors(&self) -> watch::Receiver<Option<String>> {
        self.fatal_rx.clone()
    }

    pub async fn get_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Change the symbol set without reconnecting.
    pub async fn update_subscription(&self, symbols: Vec<String>) -> Result<()> {
        self.command_tx
            .send(SubscriptionCommand::UpdateSymbols(symbols))
            .await
            .map_err(|_| anyhow::anyhow!("command channel closed"))
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(SubscriptionCommand::Shutdown).await;
    }

    async fn connection_task(
        config: StreamConfig,
        event_tx: broadcast::Sender<Tick>,
        state: Arc<RwLock<ConnectionState>>,
        mut command_rx: mpsc::Receiver<SubscriptionCommand>,
        fatal_tx: watch::Sender<Option<String>>,
        metrics: Arc<Metrics>,
    ) {
        let mut backoff = Backoff::new(config.backoff_base_seconds, config.backoff_max_seconds);
        let mut retry_window_start: Option<Instant> = None;
        let mut symbols = config.symbols.clone();

        loop {
            info!("stream manager connecting ({} symbols)", symbols.len());
            metrics.inc_reconnect(COMPONENT, STREAM);

            let result = Self::run_connection(
                &config,
                &mut symbols,
                &event_tx,
                &state,
                &mut command_rx,
                &mut backoff,
                &mut retry_window_start,
                &metrics,
            )
            .await;

            *state.write().await = ConnectionState::Disconnected;
            match result {
                Ok(ConnectionEnd::Shutdown) => {
                    info!("stream manager shut down cleanly");
                    return;
                }
                Ok(ConnectionEnd::Disconnected) => {
                    warn!("stream ended, reconnecting");
                }
                Err(e) => {
                    metrics.inc_error(COMPONENT);
                    error!("stream error (will reconnect): {e}");
                }
            }

            retry_window_start.get_or_insert_with(Instant::now);
            if let Some(started) = retry_window_start {
                if started.elapsed() > Duration::from_secs(config.max_retry_window_seconds) {
                    let msg = format!(
                        "reconnect retry window exceeded ({}s)",
                        config.max_retry_window_seconds
                    );
                    error!("{msg}");
                    *state.write().await = ConnectionState::Failed;
                    let _ = fatal_tx.send(Some(msg));
                    return;
                }
            }

            let sleep = backoff.next_sleep();
            warn!(
                "reconnecting in {:.2}s (attempt {})",
                sleep.as_secs_f64(),
                backoff.attempt()
            );
            tokio::time::sleep(sleep).await;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_connection(
        config: &StreamConfig,
        symbols: &mut Vec<String>,
        event_tx: &broadcast::Sender<Tick>,
        state: &Arc<RwLock<ConnectionState>>,
        command_rx: &mut mpsc::Receiver<SubscriptionCommand>,
        backoff: &mut Backoff,
        retry_window_start: &mut Option<Instant>,
        metrics: &Arc<Metrics>,
    ) -> Result<ConnectionEnd> {
        let (ws_stream, _) = connect_async(&config.ws_url)
            .await
            .context("websocket connect")?;
        *state.write().await = ConnectionState::Connected;
        info!("stream manager connected");

        let (mut write, mut read) = ws_stream.split();
        let read_deadline = Duration::from_secs(config.read_deadline_seconds.max(1));
        let mut authenticated = false;
        let mut reset_backoff_on_first_event = true;

        // Trade-flow silence detection, distinct from the read deadline:
        // pings and control frames keep the socket talking even when the
        // upstream has stopped sending data.
        let silence_threshold = Duration::from_secs(config.silence_threshold_seconds.max(1));
        let mut health = StreamHealthMonitor::new("trades", silence_threshold);
        let mut health_check =
            tokio::time::interval(silence_threshold.div_f64(2.0).max(Duration::from_secs(1)));

        loop {
            tokio::select! {
                _ = health_check.tick() => {
                    if authenticated && !health.is_healthy() {
                        warn!(
                            "no trades for {:?} on a live connection, forcing reconnect",
                            health.last_event_elapsed()
                        );
                        return Ok(ConnectionEnd::Disconnected);
                    }
                }
                msg = tokio::time::timeout(read_deadline, read.next()) => {
                    let msg = match msg {
                        Err(_) => {
                            warn!("websocket read deadline ({read_deadline:?}) exceeded");
                            return Ok(ConnectionEnd::Disconnected);
                        }
                        Ok(None) => return Ok(ConnectionEnd::Disconnected),
                        Ok(Some(Err(e))) => return Err(e.into()),
                        Ok(Some(Ok(m))) => m,
                    };

                    match msg {
                        Message::Text(text) => {
                            let Ok(messages) = serde_json::from_str::<Vec<BrokerMessage>>(&text) else {
                                metrics.inc_error(COMPONENT);
                                continue;
                            };
                            for message in messages {
                                match message {
                                    BrokerMessage::Success { msg } => {
                                        info!("stream: {msg}");
                                        if msg == "connected" && !authenticated {
                                            let auth = serde_json::json!({
                                                "action": "auth",
                                                "key": config.api_key,
                                                "secret": config.api_secret,
                                            });
                                            write.send(Message::Text(auth.to_string().into())).await?;
                                        } else if msg == "authenticated" {
                                            authenticated = true;
                                            *state.write().await = ConnectionState::Authenticated;
                                            if !symbols.is_empty() {
                                                Self::send_subscription(&mut write, symbols).await?;
                                                *state.write().await = ConnectionState::Subscribed;
                                            }
                                        }
                                    }
                                    BrokerMessage::Error { code, msg } => {
                                        error!("stream error ({code}): {msg}");
                                    }
                                    BrokerMessage::Subscription { trades } => {
                                        info!("stream subscribed: {trades:?}");
                                    }
                                    BrokerMessage::Trade(trade) => {
                                        metrics.inc_received(COMPONENT, STREAM);
                                        health.record_event();
                                        if reset_backoff_on_first_event {
                                            backoff.reset();
                                            *retry_window_start = None;
                                            reset_backoff_on_first_event = false;
                                            info!("stream recovered, backoff reset");
                                        }
                                        match trade.to_tick() {
                                            Ok(tick) => {
                                                let _ = event_tx.send(tick);
                                            }
                                            Err(e) => {
                                                metrics.inc_error(COMPONENT);
                                                warn!("bad trade message: {e}");
                                            }
                                        }
                                    }
                                    BrokerMessage::Other => {}
                                }
                            }
                        }
                        Message::Ping(payload) => {
                            write.send(Message::Pong(payload)).await?;
                        }
                        Message::Close(_) => {
                            info!("stream closed by server");
                            return Ok(ConnectionEnd::Disconnected);
                        }
                        _ => {}
                    }
                }

                Some(cmd) = command_rx.recv() => {
                    match cmd {
                        SubscriptionCommand::UpdateSymbols(new_symbols) => {
                            if authenticated && new_symbols != *symbols {
                                info!("updating subscription to {new_symbols:?}");
                                Self::send_subscription(&mut write, &new_symbols).await?;
                                *symbols = new_symbols;
                                *state.write().await = ConnectionState::Subscribed;
                            } else if !authenticated {
                                warn!("cannot update subscription before auth");
                                *symbols = new_symbols;
                            }
                        }
                        SubscriptionCommand::Shutdown => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(ConnectionEnd::Shutdown);
                        }
                    }
                }
            }
        }
    }

    async fn send_subscription(
        write: &mut futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<
                tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
            >,
            Message,
        >,
        symbols: &[String],
    ) -> Result<()> {
        let subscribe = serde_json::json!({
            "action": "subscribe",
            "trades": symbols,
        });
        write
            .send(Message::Text(subscribe.to_string().into()))
            .await
            .context("send subscription")?;
        Ok(())
    }
}

enum ConnectionEnd {
    Disconnected,
    Shutdown,
}
