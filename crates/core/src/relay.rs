//! The relay core: one client connection paired with one upstream connection.
//!
//! Two pumps run as separate tasks for the life of the session:
//!
//! - inbound: client audio frames -> `input_audio_buffer.append` upstream
//! - outbound: upstream events -> filter -> client audio/text frames
//!
//! Whichever pump stops first cancels the shared token, the other pump unwinds,
//! and both connections are closed before [`Relay::run`] returns.

use crate::{
    error::{RelayError, Result},
    protocol::{ClientEvent, ServerEvent, SessionConfig},
    session::{Directive, Session, SessionState},
    stats::{SessionCounters, SessionStats},
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{sync::Mutex, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

/// How long teardown waits for each connection's close handshake before
/// dropping the connection regardless.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Read half of the client connection.
#[async_trait]
pub trait ClientSource: Send + 'static {
    /// Waits for the next binary audio frame. `None` once the client is gone.
    async fn read_audio_frame(&mut self) -> Result<Option<Bytes>>;
}

/// Write half of the client connection. Each call writes one whole frame.
#[async_trait]
pub trait ClientSink: Send + 'static {
    async fn write_audio_frame(&mut self, frame: Bytes) -> Result<()>;
    async fn write_text(&mut self, text: String) -> Result<()>;
    /// Best-effort close; must be safe to call more than once.
    async fn close(&mut self);
}

/// Read half of the upstream connection, yielding raw JSON text.
#[async_trait]
pub trait UpstreamSource: Send + 'static {
    /// Waits for the next upstream message. `None` once the upstream is gone.
    async fn next_message(&mut self) -> Result<Option<String>>;
}

/// Write half of the upstream connection.
#[async_trait]
pub trait UpstreamSink: Send + 'static {
    async fn send_message(&mut self, text: String) -> Result<()>;
    /// Best-effort close; must be safe to call more than once.
    async fn close(&mut self);
}

/// Opens the upstream connection for a session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    type Source: UpstreamSource;
    type Sink: UpstreamSink;

    async fn connect(&self) -> Result<(Self::Source, Self::Sink)>;
}

/// How a session ended.
#[derive(Debug)]
pub struct SessionOutcome {
    pub stats: SessionStats,
    pub final_state: SessionState,
    /// The first fatal error, if the session did not end by a clean close.
    pub error: Option<RelayError>,
}

/// Runs relay sessions with a fixed deployment configuration.
#[derive(Debug, Clone)]
pub struct Relay {
    config: Arc<SessionConfig>,
    ready_timeout: Option<Duration>,
}

impl Relay {
    pub fn new(config: Arc<SessionConfig>) -> Self {
        Self {
            config,
            ready_timeout: None,
        }
    }

    /// Fails the session if `session.created` does not arrive in time.
    pub fn with_ready_timeout(mut self, ready_timeout: Option<Duration>) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Connects upstream and relays until either side closes or fails.
    pub async fn run<CS, CK, C>(
        &self,
        client_rx: CS,
        mut client_tx: CK,
        connector: &C,
    ) -> SessionOutcome
    where
        CS: ClientSource,
        CK: ClientSink,
        C: UpstreamConnector,
    {
        let started = Instant::now();
        let mut session = Session::new(self.config.clone());
        debug!(state = ?session.state(), "Connecting to upstream.");

        let (upstream_rx, upstream_tx) = match connector.connect().await {
            Ok(halves) => halves,
            Err(e) => {
                session.close();
                close_within(CLOSE_TIMEOUT, "client", client_tx.close()).await;
                return SessionOutcome {
                    stats: SessionStats {
                        duration: started.elapsed(),
                        ..SessionStats::default()
                    },
                    final_state: session.state(),
                    error: Some(e),
                };
            }
        };
        session.upstream_connected();
        info!("Connected to upstream. Awaiting session.created.");

        self.run_pumps(session, started, client_rx, client_tx, upstream_rx, upstream_tx)
            .await
    }

    /// Runs both pumps over already-open connections.
    ///
    /// Returns once both pumps have stopped and both connections are closed.
    pub async fn pump<CS, CK, US, UK>(
        &self,
        client_rx: CS,
        client_tx: CK,
        upstream_rx: US,
        upstream_tx: UK,
    ) -> SessionOutcome
    where
        CS: ClientSource,
        CK: ClientSink,
        US: UpstreamSource,
        UK: UpstreamSink,
    {
        let mut session = Session::new(self.config.clone());
        session.upstream_connected();
        self.run_pumps(
            session,
            Instant::now(),
            client_rx,
            client_tx,
            upstream_rx,
            upstream_tx,
        )
        .await
    }

    async fn run_pumps<CS, CK, US, UK>(
        &self,
        session: Session,
        started: Instant,
        client_rx: CS,
        client_tx: CK,
        upstream_rx: US,
        upstream_tx: UK,
    ) -> SessionOutcome
    where
        CS: ClientSource,
        CK: ClientSink,
        US: UpstreamSource,
        UK: UpstreamSink,
    {
        let token = CancellationToken::new();
        let counters = Arc::new(SessionCounters::default());
        let upstream_tx = Arc::new(Mutex::new(upstream_tx));
        let client_tx = Arc::new(Mutex::new(client_tx));

        let inbound = tokio::spawn(
            inbound_pump(
                client_rx,
                upstream_tx.clone(),
                counters.clone(),
                token.clone(),
            )
            .in_current_span(),
        );
        let outbound = tokio::spawn(
            outbound_pump(
                session,
                upstream_rx,
                client_tx.clone(),
                upstream_tx.clone(),
                counters.clone(),
                self.ready_timeout,
                token.clone(),
            )
            .in_current_span(),
        );

        let (inbound, outbound) = tokio::join!(inbound, outbound);

        // Both pumps have stopped; release both sockets. A close that stalls is
        // abandoned and the connection is dropped with the session.
        tokio::join!(
            close_within(CLOSE_TIMEOUT, "upstream", async {
                upstream_tx.lock().await.close().await
            }),
            close_within(CLOSE_TIMEOUT, "client", async {
                client_tx.lock().await.close().await
            }),
        );

        let inbound_result = inbound.unwrap_or_else(|e| {
            Err(RelayError::transport(format!("inbound pump aborted: {e}")))
        });
        let (final_state, outbound_result) = match outbound {
            Ok((session, result)) => (session.state(), result),
            Err(e) => (
                SessionState::Closed,
                Err(RelayError::transport(format!("outbound pump aborted: {e}"))),
            ),
        };

        SessionOutcome {
            stats: counters.snapshot(started.elapsed()),
            final_state,
            error: inbound_result.err().or(outbound_result.err()),
        }
    }
}

async fn close_within(limit: Duration, side: &str, close: impl Future<Output = ()>) {
    if timeout(limit, close).await.is_err() {
        warn!(side, "Connection did not close in time; dropping it.");
    }
}

/// Client audio -> upstream appends, until the client leaves or cancellation.
async fn inbound_pump<CS, UK>(
    mut client_rx: CS,
    upstream_tx: Arc<Mutex<UK>>,
    counters: Arc<SessionCounters>,
    token: CancellationToken,
) -> Result<()>
where
    CS: ClientSource,
    UK: UpstreamSink,
{
    let _cancel_on_exit = token.clone().drop_guard();

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Ok(()),
        result = forward_client_audio(&mut client_rx, &upstream_tx, &counters) => result,
    };
    if let Err(e) = &result {
        debug!(error = %e, "Inbound pump stopped with error.");
    }
    result
}

async fn forward_client_audio<CS, UK>(
    client_rx: &mut CS,
    upstream_tx: &Mutex<UK>,
    counters: &SessionCounters,
) -> Result<()>
where
    CS: ClientSource,
    UK: UpstreamSink,
{
    while let Some(frame) = client_rx.read_audio_frame().await? {
        let event = ClientEvent::append(&frame).to_json()?;
        upstream_tx.lock().await.send_message(event).await?;
        counters.frame_appended();
    }
    debug!("Client closed the connection.");
    Ok(())
}

/// Upstream events -> filter -> client, until the upstream leaves or cancellation.
async fn outbound_pump<US, CK, UK>(
    mut session: Session,
    mut upstream_rx: US,
    client_tx: Arc<Mutex<CK>>,
    upstream_tx: Arc<Mutex<UK>>,
    counters: Arc<SessionCounters>,
    ready_timeout: Option<Duration>,
    token: CancellationToken,
) -> (Session, Result<()>)
where
    US: UpstreamSource,
    CK: ClientSink,
    UK: UpstreamSink,
{
    let _cancel_on_exit = token.clone().drop_guard();
    let ready_deadline = ready_timeout.map(|limit| (tokio::time::Instant::now() + limit, limit));

    let result = tokio::select! {
        biased;
        _ = token.cancelled() => Ok(()),
        result = forward_upstream_events(
            &mut session,
            &mut upstream_rx,
            &client_tx,
            &upstream_tx,
            &counters,
            ready_deadline,
        ) => result,
    };
    if let Err(e) = &result {
        debug!(error = %e, "Outbound pump stopped with error.");
    }
    session.close();
    (session, result)
}

async fn forward_upstream_events<US, CK, UK>(
    session: &mut Session,
    upstream_rx: &mut US,
    client_tx: &Mutex<CK>,
    upstream_tx: &Mutex<UK>,
    counters: &SessionCounters,
    ready_deadline: Option<(tokio::time::Instant, Duration)>,
) -> Result<()>
where
    US: UpstreamSource,
    CK: ClientSink,
    UK: UpstreamSink,
{
    loop {
        let next = match ready_deadline {
            Some((deadline, limit)) if session.state() == SessionState::AwaitingReady => {
                tokio::time::timeout_at(deadline, upstream_rx.next_message())
                    .await
                    .map_err(|_| RelayError::ReadyTimeout(limit))??
            }
            _ => upstream_rx.next_message().await?,
        };
        let Some(text) = next else {
            debug!("Upstream closed the connection.");
            return Ok(());
        };

        match session.on_event(ServerEvent::parse(&text)?)? {
            Directive::SendUpstream(event) => {
                upstream_tx.lock().await.send_message(event.to_json()?).await?;
            }
            Directive::ClientAudio(frame) => {
                client_tx.lock().await.write_audio_frame(frame).await?;
                counters.audio_delivered();
            }
            Directive::ClientText(text) => {
                client_tx.lock().await.write_text(text).await?;
                counters.transcript_delivered();
            }
            Directive::Drop => {}
        }
    }
}
