//! Stream session: transport, protocol state machine, subscriptions.
//!
//! One session owns one TLS connection, the decoder (and through it both
//! caches), and the heartbeat monitor. Everything is driven from a single
//! logical task: `run()` reads lines, decodes them synchronously, and
//! invokes callbacks inline. Callbacks receive borrows of the caches that
//! must not outlive the call.

pub mod heartbeat;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};

use crate::cache::{MarketState, OrderState};
use crate::config::{Credentials, StreamConfig};
use crate::decoder::{Decoder, StreamClocks, StreamEvent};
use crate::domain::MarketId;
use crate::error::{Error, Result};
use crate::protocol::{
    AuthenticationRequest, MarketSubscriptionRequest, OrderFilter, OrderSubscriptionRequest,
    StatusCode, StatusMessage,
};

pub use heartbeat::HeartbeatMonitor;
pub use state::{SessionEvent, SessionPhase};

/// Called after each market cache mutation with the cache and delta list.
pub type MarketChangeCallback = Box<dyn FnMut(&MarketState, &[String]) + Send>;
/// Called after each order cache mutation with the cache and delta list.
pub type OrderChangeCallback = Box<dyn FnMut(&OrderState, &[String]) + Send>;
/// Called once per inbound line, before the decoder touches the caches.
pub type RawDataCallback = Box<dyn FnMut(&str) + Send>;

type DynReader = Box<dyn AsyncRead + Send + Unpin>;
type DynWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Default)]
struct Callbacks {
    market: Option<MarketChangeCallback>,
    order: Option<OrderChangeCallback>,
    raw: Option<RawDataCallback>,
}

/// Outbound requests awaiting a status acknowledgement, by packet id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingRequest {
    Authentication,
    MarketSubscription,
    OrderSubscription,
}

#[derive(Clone)]
struct OrderSubscriptionState {
    filter: Option<OrderFilter>,
}

/// A stream session.
///
/// Lifecycle: `connect → authenticate → subscribe_markets / subscribe_orders
/// → run`. After that the flow is inbound-driven; `restart()` tears the
/// connection down and rebuilds it with the previous subscriptions.
pub struct StreamSession {
    config: StreamConfig,
    credentials: Credentials,
    phase: SessionPhase,
    decoder: Decoder,
    heartbeat: HeartbeatMonitor,
    callbacks: Callbacks,
    reader: Option<BufReader<DynReader>>,
    writer: Option<DynWriter>,
    connection_id: Option<String>,
    pending: HashMap<i64, PendingRequest>,
    subscribed_markets: Vec<MarketId>,
    order_subscription: Option<OrderSubscriptionState>,
    heartbeat_interval_ms: u64,
}

impl StreamSession {
    #[must_use]
    pub fn new(config: StreamConfig, credentials: Credentials) -> Self {
        let decoder = Decoder::new(config.currency.rate, config.segment_limits());
        let heartbeat_interval_ms = config.heartbeat_ms;
        Self {
            config,
            credentials,
            phase: SessionPhase::Disconnected,
            decoder,
            heartbeat: HeartbeatMonitor::new(|| {
                // Policy: a missed heartbeat is logged, not acted on; the
                // embedder owns restart(). Override with
                // on_heartbeat_attack to hook in your own reaction.
            }),
            callbacks: Callbacks::default(),
            reader: None,
            writer: None,
            connection_id: None,
            pending: HashMap::new(),
            subscribed_markets: Vec::new(),
            order_subscription: None,
            heartbeat_interval_ms,
        }
    }

    /// Register the market-change callback.
    #[must_use]
    pub fn on_market_change(
        mut self,
        callback: impl FnMut(&MarketState, &[String]) + Send + 'static,
    ) -> Self {
        self.callbacks.market = Some(Box::new(callback));
        self
    }

    /// Register the order-change callback.
    #[must_use]
    pub fn on_order_change(
        mut self,
        callback: impl FnMut(&OrderState, &[String]) + Send + 'static,
    ) -> Self {
        self.callbacks.order = Some(Box::new(callback));
        self
    }

    /// Register the raw-data tap. It sees each received line exactly once,
    /// in arrival order, before the decoder mutates the caches.
    #[must_use]
    pub fn on_raw_data(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.callbacks.raw = Some(Box::new(callback));
        self
    }

    /// Replace the heartbeat-miss hook. Fires once per missed grace period.
    #[must_use]
    pub fn on_heartbeat_attack(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.heartbeat = HeartbeatMonitor::new(callback);
        self
    }

    /// Establish the TLS connection and wait for the server's `connection`
    /// greeting.
    pub async fn connect(&mut self) -> Result<()> {
        self.phase = SessionPhase::Connecting;
        info!(host = %self.config.host, port = self.config.port, "connecting to stream endpoint");

        let tcp = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));
        let domain = ServerName::try_from(self.config.host.clone())
            .map_err(|_| Error::InvalidHost(self.config.host.clone()))?;

        let tls = connector.connect(domain, tcp).await?;
        let (read_half, write_half) = tokio::io::split(tls);
        self.attach(read_half, write_half);
        self.await_connection().await
    }

    /// Attach an already-established transport instead of dialing TLS.
    ///
    /// This is how recorded streams are replayed through the full session
    /// pipeline, and how tests drive the session without a network. Follow
    /// with [`StreamSession::await_connection`].
    pub fn attach<R, W>(&mut self, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.reader = Some(BufReader::new(Box::new(reader) as DynReader));
        self.writer = Some(Box::new(writer));
        self.phase = SessionPhase::Connecting;
    }

    /// Read frames until the server's `connection` greeting arrives.
    pub async fn await_connection(&mut self) -> Result<()> {
        loop {
            if let StreamEvent::Connection(_) = self.read_event().await? {
                self.phase = self.phase.on_event(SessionEvent::TcpEstablished);
                return Ok(());
            }
        }
    }

    /// Send the authentication request and drive inbound frames until the
    /// matching status arrives. Failure closes the session.
    pub async fn authenticate(&mut self) -> Result<()> {
        let id = self.next_packet_id();
        let request = AuthenticationRequest::new(
            id,
            self.credentials.app_key.clone(),
            self.credentials.session_token.clone(),
        );
        self.pending.insert(id, PendingRequest::Authentication);
        self.send(&request).await?;
        debug!(packet_id = id, "authentication sent");

        loop {
            let event = self.read_event().await?;
            if let StreamEvent::Status(status) = event {
                if status.id == Some(id) {
                    return match status.status_code {
                        StatusCode::Success => {
                            info!("authenticated");
                            Ok(())
                        }
                        StatusCode::Failure => {
                            let reason = status.reason();
                            error!(reason = %reason, "authentication failed");
                            self.close().await?;
                            Err(Error::AuthFailed(reason))
                        }
                    };
                }
            }
            if self.phase.is_terminal() {
                return Err(Error::Disconnected("closed during authentication".into()));
            }
        }
    }

    /// Subscribe to a set of markets.
    ///
    /// Resets the market cache, the delta list and the market segment
    /// buffer, then sends the subscription frame. An empty list also stops
    /// the heartbeat monitor.
    pub async fn subscribe_markets(&mut self, market_ids: &[MarketId]) -> Result<()> {
        for market_id in market_ids {
            if !market_id.is_well_formed() {
                warn!(market = %market_id, "subscribing to malformed market id");
            }
        }
        self.decoder.reset_markets();
        self.subscribed_markets = market_ids.to_vec();
        self.heartbeat_interval_ms = self.config.heartbeat_ms;

        if market_ids.is_empty() {
            self.heartbeat.stop();
        } else if !self.heartbeat.is_beating() {
            self.heartbeat
                .start(Duration::from_millis(self.heartbeat_interval_ms));
        }

        self.send_market_subscription(market_ids.to_vec(), None).await
    }

    /// Subscribe to the account's order stream. Does not touch the market
    /// cache.
    pub async fn subscribe_orders(&mut self, filter: Option<OrderFilter>) -> Result<()> {
        self.order_subscription = Some(OrderSubscriptionState {
            filter: filter.clone(),
        });
        if !self.heartbeat.is_beating() {
            self.heartbeat
                .start(Duration::from_millis(self.heartbeat_interval_ms));
        }

        let id = self.next_packet_id();
        let request =
            OrderSubscriptionRequest::new(id, filter, self.config.segmentation_enabled);
        self.pending.insert(id, PendingRequest::OrderSubscription);
        self.send(&request).await?;
        info!(packet_id = id, "order subscription sent");
        Ok(())
    }

    /// Drive the inbound loop until the connection ends.
    ///
    /// Callbacks fire inline as frames are decoded. Returns the transport
    /// error that ended the stream.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            self.read_event().await?;
        }
    }

    /// Tear down the connection: socket, heartbeat, pending requests and
    /// buffered segments all go. The caches stay readable.
    pub async fn close(&mut self) -> Result<()> {
        self.phase = self.phase.on_event(SessionEvent::Close);
        self.heartbeat.stop();
        if let Some(writer) = self.writer.as_mut() {
            // best effort: the peer may already be gone
            let _ = writer.shutdown().await;
        }
        self.reader = None;
        self.writer = None;
        self.pending.clear();
        self.decoder.clear_segments();
        self.connection_id = None;
        self.phase = SessionPhase::Closed;
        info!("session closed");
        Ok(())
    }

    /// Close, reconnect, authenticate and re-send the previous market and
    /// order subscriptions, resuming from the last observed stream clocks.
    pub async fn restart(&mut self) -> Result<()> {
        let market_clocks = self.decoder.market_clocks().clone();
        let markets = self.subscribed_markets.clone();
        let order_subscription = self.order_subscription.clone();

        self.close().await?;
        self.connect().await?;
        self.authenticate().await?;

        if !markets.is_empty() {
            self.decoder.reset_markets();
            self.subscribed_markets = markets.clone();
            self.heartbeat
                .start(Duration::from_millis(self.config.heartbeat_ms));
            self.send_market_subscription(markets, Some(market_clocks))
                .await?;
        }
        if let Some(subscription) = order_subscription {
            self.subscribe_orders(subscription.filter).await?;
        }
        Ok(())
    }

    /// The market cache.
    #[must_use]
    pub fn markets(&self) -> &MarketState {
        self.decoder.markets()
    }

    /// The order cache.
    #[must_use]
    pub fn orders(&self) -> &OrderState {
        self.decoder.orders()
    }

    /// The decoder, for counters and clocks.
    #[must_use]
    pub const fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Connection id from the server greeting.
    #[must_use]
    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// Markets currently subscribed to.
    #[must_use]
    pub fn subscribed_markets(&self) -> &[MarketId] {
        &self.subscribed_markets
    }

    async fn send_market_subscription(
        &mut self,
        market_ids: Vec<MarketId>,
        resume: Option<StreamClocks>,
    ) -> Result<()> {
        let id = self.next_packet_id();
        let ids: Vec<String> = market_ids
            .iter()
            .map(|m| m.as_str().to_string())
            .collect();
        let mut request = MarketSubscriptionRequest::new(
            id,
            ids,
            self.config.segmentation_enabled,
            self.config.conflate_ms,
            self.config.heartbeat_ms,
        );
        if let Some(clocks) = resume {
            request = request.resume_from(clocks.initial_clk, clocks.clk);
        }
        self.pending.insert(id, PendingRequest::MarketSubscription);
        self.send(&request).await?;
        info!(
            packet_id = id,
            markets = market_ids.len(),
            "market subscription sent"
        );
        Ok(())
    }

    /// Read one line, decode it, run bookkeeping and callbacks.
    async fn read_event(&mut self) -> Result<StreamEvent> {
        let reader = self.reader.as_mut().ok_or(Error::NotConnected)?;
        let mut line = String::new();
        let read = match reader.read_line(&mut line).await {
            Ok(read) => read,
            Err(e) => {
                self.phase = self.phase.on_event(SessionEvent::SocketError);
                return Err(e.into());
            }
        };
        if read == 0 {
            self.phase = self.phase.on_event(SessionEvent::SocketError);
            return Err(Error::Disconnected("end of stream".into()));
        }

        if self.heartbeat.is_beating() {
            self.heartbeat.refresh();
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Ok(StreamEvent::Dropped);
        }

        // raw tap first: exactly once per line, before any cache mutation
        if let Some(callback) = self.callbacks.raw.as_mut() {
            callback(trimmed);
        }

        let event = self
            .decoder
            .process_line(trimmed, self.phase.accepts_changes());
        match &event {
            StreamEvent::Connection(msg) => {
                info!(connection_id = %msg.connection_id, "stream connection established");
                self.connection_id = Some(msg.connection_id.clone());
            }
            StreamEvent::Status(status) => self.handle_status(status),
            StreamEvent::MarketUpdate => {
                if let Some(callback) = self.callbacks.market.as_mut() {
                    callback(self.decoder.markets(), self.decoder.deltas());
                }
                self.decoder.clear_deltas();
            }
            StreamEvent::OrderUpdate => {
                if let Some(callback) = self.callbacks.order.as_mut() {
                    callback(self.decoder.orders(), self.decoder.deltas());
                }
                self.decoder.clear_deltas();
            }
            StreamEvent::Heartbeat | StreamEvent::Buffered | StreamEvent::Dropped => {}
        }

        // the server may echo a different heartbeat interval than requested
        if let Some(ms) = self.decoder.negotiated_heartbeat_ms() {
            if ms != self.heartbeat_interval_ms {
                info!(heartbeat_ms = ms, "server adjusted heartbeat interval");
                self.heartbeat_interval_ms = ms;
                self.heartbeat.update_interval(Duration::from_millis(ms));
            }
        }
        Ok(event)
    }

    fn handle_status(&mut self, status: &StatusMessage) {
        if let Some(id) = status.id {
            match self.pending.remove(&id) {
                Some(PendingRequest::Authentication) => {
                    let success = status.status_code == StatusCode::Success;
                    self.phase = self.phase.on_event(SessionEvent::AuthAck { success });
                }
                Some(PendingRequest::MarketSubscription | PendingRequest::OrderSubscription) => {
                    if status.status_code == StatusCode::Success {
                        self.phase = self.phase.on_event(SessionEvent::SubscriptionAck);
                        debug!(packet_id = id, "subscription acknowledged");
                    } else {
                        // surfaced but not fatal: the connection stays up
                        error!(
                            packet_id = id,
                            reason = %status.reason(),
                            "subscription failed"
                        );
                    }
                }
                None => debug!(packet_id = id, "status for unknown request id"),
            }
        }
        if status.connection_closed == Some(true) {
            warn!("server reported connection closed");
            self.phase = self.phase.on_event(SessionEvent::SocketError);
        }
    }

    async fn send<T: Serialize>(&mut self, frame: &T) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;
        let mut line = serde_json::to_string(frame)?;
        line.push_str("\r\n");
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Pseudorandom packet id in `[10^8, 10^9)`.
    fn next_packet_id(&self) -> i64 {
        rand::thread_rng().gen_range(100_000_000..1_000_000_000)
    }
}
