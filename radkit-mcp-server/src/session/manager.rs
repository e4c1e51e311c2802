//! Remote session lifecycle
//!
//! State machine:
//!
//! ```text
//! Uninitialized --acquire--> Connecting --ok--> Ready --shutdown--> Closed
//!       ^                        |
//!       +--------failure---------+
//! ```
//!
//! `Closed` is terminal. Shutdown during `Connecting` waits for the attempt
//! to resolve and then tears the new session down. Callers waiting on that
//! attempt receive its failure, or [`FleetError::SessionClosed`] if it
//! succeeded; callers arriving after shutdown began get `SessionClosed`.
//!
//! A connect that outlives its deadline is reported as a failure, and the
//! session it eventually produces is closed on the worker that opened it.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::blocking::BlockingBridge;
use crate::fleet::{Credentials, FleetConnector, FleetError, FleetSession};

/// Live session, loaned to one remote call at a time
pub type SessionHandle<S> = Arc<S>;

/// Observable lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connecting,
    Ready,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// `None` until the in-flight attempt resolves
type AttemptOutcome<S> = Option<Result<SessionHandle<S>, FleetError>>;

/// The session plus its teardown, released at most once
struct ConnectionContext<S> {
    session: SessionHandle<S>,
}

enum Lifecycle<S> {
    Uninitialized,
    Connecting(watch::Receiver<AttemptOutcome<S>>),
    Ready(ConnectionContext<S>),
    Closed,
}

/// Hand-off between a connect worker and the attempt waiting on it
///
/// Once the attempt stops waiting it marks the slot abandoned, and a
/// connect that completes later closes its own session.
struct ConnectSlot<S> {
    session: Option<S>,
    abandoned: bool,
}

struct Inner<S> {
    lifecycle: Lifecycle<S>,
    /// Set once shutdown starts; blocks any new connect attempt
    closing: bool,
}

enum Claim<S> {
    Connect(watch::Sender<AttemptOutcome<S>>, watch::Receiver<AttemptOutcome<S>>),
    Wait(watch::Receiver<AttemptOutcome<S>>),
}

enum ShutdownStep<S> {
    AwaitAttempt(watch::Receiver<AttemptOutcome<S>>),
    Release(ConnectionContext<S>),
    Done,
}

/// Owns the single remote session of this process
pub struct SessionManager<C: FleetConnector> {
    connector: Arc<C>,
    credentials: Credentials,
    bridge: BlockingBridge,
    /// Lock-free fast path; only populated while Ready and not closing
    published: ArcSwapOption<C::Session>,
    inner: Mutex<Inner<C::Session>>,
}

impl<C: FleetConnector> SessionManager<C> {
    pub fn new(connector: C, credentials: Credentials, bridge: BlockingBridge) -> Self {
        Self {
            connector: Arc::new(connector),
            credentials,
            bridge,
            published: ArcSwapOption::empty(),
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::Uninitialized,
                closing: false,
            }),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        match self.inner.lock().lifecycle {
            Lifecycle::Uninitialized => SessionState::Uninitialized,
            Lifecycle::Connecting(_) => SessionState::Connecting,
            Lifecycle::Ready(_) => SessionState::Ready,
            Lifecycle::Closed => SessionState::Closed,
        }
    }

    /// Return the live session, connecting on first use
    ///
    /// Exactly one caller starts a connect; everyone else arriving while it
    /// runs suspends until it resolves and observes the same outcome.
    pub async fn acquire_session(self: &Arc<Self>) -> Result<SessionHandle<C::Session>, FleetError> {
        if let Some(handle) = self.published.load_full() {
            return Ok(handle);
        }

        let claim = {
            let mut inner = self.inner.lock();
            if inner.closing {
                return Err(FleetError::SessionClosed);
            }

            let in_flight = match &inner.lifecycle {
                Lifecycle::Ready(ctx) => return Ok(Arc::clone(&ctx.session)),
                Lifecycle::Closed => return Err(FleetError::SessionClosed),
                Lifecycle::Connecting(rx) => Some(rx.clone()),
                Lifecycle::Uninitialized => None,
            };

            match in_flight {
                Some(rx) => Claim::Wait(rx),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inner.lifecycle = Lifecycle::Connecting(rx.clone());
                    Claim::Connect(tx, rx)
                }
            }
        };

        match claim {
            Claim::Wait(rx) => {
                debug!("Waiting on in-flight connection attempt");
                await_attempt(rx).await
            }
            Claim::Connect(tx, rx) => {
                // Detached so a cancelled caller cannot strand the state in Connecting
                tokio::spawn(Arc::clone(self).drive_connect(tx));
                await_attempt(rx).await
            }
        }
    }

    async fn drive_connect(self: Arc<Self>, tx: watch::Sender<AttemptOutcome<C::Session>>) {
        info!(
            username = %self.credentials.username,
            "Creating new remote service connection"
        );

        let connector = Arc::clone(&self.connector);
        let credentials = self.credentials.clone();
        let slot = Arc::new(Mutex::new(ConnectSlot {
            session: None,
            abandoned: false,
        }));
        let worker_slot = Arc::clone(&slot);

        let finished = self
            .bridge
            .run(move || {
                let session = connector.connect(&credentials)?;
                let mut slot = worker_slot.lock();
                if slot.abandoned {
                    drop(slot);
                    warn!("Connection completed after its attempt gave up, closing it");
                    if let Err(e) = session.close() {
                        warn!(error = %e, "Failed to close abandoned connection");
                    }
                } else {
                    slot.session = Some(session);
                }
                Ok(())
            })
            .await;

        // Whichever side takes the slot lock first decides who owns the session
        let deposited = {
            let mut slot = slot.lock();
            slot.abandoned = true;
            slot.session.take()
        };

        let result = match (deposited, finished) {
            (Some(session), _) => Ok(session),
            (None, Err(FleetError::ConnectionFailure(msg))) => Err(FleetError::ConnectionFailure(msg)),
            (None, Err(other)) => Err(FleetError::ConnectionFailure(other.to_string())),
            (None, Ok(())) => Err(FleetError::connection("connect returned without a session")),
        };

        let outcome = {
            let mut inner = self.inner.lock();
            match result {
                Ok(session) => {
                    let handle = Arc::new(session);
                    inner.lifecycle = Lifecycle::Ready(ConnectionContext {
                        session: Arc::clone(&handle),
                    });
                    info!("Remote service connection established");

                    if inner.closing {
                        // Shutdown owns the new session now and releases it
                        Err(FleetError::SessionClosed)
                    } else {
                        self.published.store(Some(Arc::clone(&handle)));
                        Ok(handle)
                    }
                }
                Err(e) => {
                    inner.lifecycle = Lifecycle::Uninitialized;
                    error!(error = %e, "Error creating remote service connection");
                    Err(e)
                }
            }
        };

        tx.send_replace(Some(outcome));
    }

    /// Release the session and move to Closed. Idempotent.
    ///
    /// An attempt already in flight is awaited first. If it succeeds, its
    /// waiters get `SessionClosed` and the new session is released here.
    ///
    /// Teardown failures are logged, never returned: the process is going
    /// away and the service expires abandoned sessions on its own.
    pub async fn shutdown(&self) {
        loop {
            let step = {
                let mut inner = self.inner.lock();
                inner.closing = true;
                self.published.store(None);

                match std::mem::replace(&mut inner.lifecycle, Lifecycle::Closed) {
                    Lifecycle::Connecting(rx) => {
                        inner.lifecycle = Lifecycle::Connecting(rx.clone());
                        ShutdownStep::AwaitAttempt(rx)
                    }
                    Lifecycle::Ready(ctx) => ShutdownStep::Release(ctx),
                    Lifecycle::Uninitialized => {
                        info!("Session manager closed before any connection was made");
                        ShutdownStep::Done
                    }
                    Lifecycle::Closed => {
                        debug!("Session manager already closed");
                        ShutdownStep::Done
                    }
                }
            };

            match step {
                ShutdownStep::AwaitAttempt(rx) => {
                    info!("Shutdown waiting for in-flight connection attempt");
                    let _ = await_attempt(rx).await;
                }
                ShutdownStep::Release(ctx) => {
                    self.release(ctx).await;
                    return;
                }
                ShutdownStep::Done => return,
            }
        }
    }

    async fn release(&self, ctx: ConnectionContext<C::Session>) {
        let session = ctx.session;
        if Arc::strong_count(&session) > 1 {
            debug!(
                loans = Arc::strong_count(&session) - 1,
                "Closing session with calls still in flight"
            );
        }

        match self.bridge.run(move || session.close()).await {
            Ok(()) => info!("Remote service connection closed"),
            Err(FleetError::RemoteTimeout(after)) => {
                warn!(timeout = ?after, "Timed out closing remote service connection")
            }
            Err(e) => error!(error = %e, "Error closing remote service connection"),
        }
    }
}

async fn await_attempt<S>(
    mut rx: watch::Receiver<AttemptOutcome<S>>,
) -> Result<SessionHandle<S>, FleetError> {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(outcome) => (*outcome).clone(),
        Err(_) => None,
    };

    outcome.unwrap_or_else(|| {
        Err(FleetError::connection("connection attempt was abandoned"))
    })
}
