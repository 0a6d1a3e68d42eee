//! Session protocol state machine.

use tracing::debug;

/// Where the session is in its protocol lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Authenticating,
    Authenticated,
    Subscribed,
    Closing,
    Closed,
}

/// Events that drive phase transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    TcpEstablished,
    AuthAck { success: bool },
    SubscriptionAck,
    SocketError,
    Close,
}

impl SessionPhase {
    /// Apply one event. Invalid combinations keep the current phase.
    #[must_use]
    pub fn on_event(self, event: SessionEvent) -> Self {
        use SessionEvent as E;
        use SessionPhase as P;

        let next = match (self, event) {
            (P::Connecting, E::TcpEstablished) => P::Authenticating,
            (P::Authenticating, E::AuthAck { success: true }) => P::Authenticated,
            // auth failure aborts the session
            (P::Authenticating, E::AuthAck { success: false }) => P::Closed,
            (P::Authenticated | P::Subscribed, E::SubscriptionAck) => P::Subscribed,
            (_, E::SocketError) => P::Closed,
            (_, E::Close) => P::Closing,
            (current, event) => {
                debug!(?current, ?event, "ignoring session event");
                current
            }
        };
        next
    }

    /// Whether `mcm`/`ocm` frames should be merged in this phase.
    #[must_use]
    pub const fn accepts_changes(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Subscribed)
    }

    /// Whether the session can send outbound frames.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(
            self,
            Self::Authenticating | Self::Authenticated | Self::Subscribed
        )
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
