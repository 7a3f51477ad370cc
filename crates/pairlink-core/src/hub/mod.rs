//! SignalingHub: the pairing/presence state machine.
//!
//! The hub owns the three registries and processes one event at a time:
//! an inbound [`ClientMessage`], a disconnect, a deferred code expiry, or a
//! sweep tick.  Each call runs to completion and returns the [`Effect`]s the
//! transport must carry out, so every registry mutation inside one event is
//! atomic with respect to every other event.
//!
//! The hub performs no I/O and never sleeps.  It does not own timers either:
//! when a code is issued it emits [`Effect::ScheduleExpiry`], and the runtime
//! calls [`SignalingHub::expire_code`] when that timer fires.  Codes that are
//! consumed, replaced, or withdrawn emit [`Effect::CancelExpiry`] so the
//! runtime can drop the timer instead of letting it fire into nothing.

pub mod relay;

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{
    Clock, ConnectionId, PeerIdentity, PeerState, Role, SignalError, SystemClock,
};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{CodeRegistry, PairRegistry, PairingCode, PresenceDirectory, DEFAULT_CODE_TTL};

pub use relay::{SignalKind, SignalingRelay};

/// Work the transport must perform after an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send `message` on connection `to`.
    Deliver {
        to: ConnectionId,
        message: ServerMessage,
    },
    /// Call [`SignalingHub::expire_code`]`(code, serial)` once `after` elapses.
    ScheduleExpiry {
        code: String,
        serial: u64,
        after: Duration,
    },
    /// The timer scheduled for `serial` is no longer needed.
    CancelExpiry { serial: u64 },
}

/// Collects effects while one event is processed.
#[derive(Default)]
struct Outbox {
    effects: Vec<Effect>,
}

impl Outbox {
    fn deliver(&mut self, to: ConnectionId, message: ServerMessage) {
        self.effects.push(Effect::Deliver { to, message });
    }

    /// Delivers to whichever connection currently carries `identity`.
    /// Offline identities simply miss the message.
    fn notify(
        &mut self,
        presence: &PresenceDirectory,
        identity: &PeerIdentity,
        message: ServerMessage,
    ) {
        if let Some(to) = presence.handle_of(identity) {
            self.deliver(to, message);
        }
    }

    fn schedule(&mut self, code: &PairingCode, after: Duration) {
        self.effects.push(Effect::ScheduleExpiry {
            code: code.code.clone(),
            serial: code.serial,
            after,
        });
    }

    fn cancel(&mut self, code: &PairingCode) {
        self.effects.push(Effect::CancelExpiry {
            serial: code.serial,
        });
    }
}

/// The relay's whole mutable state.
pub struct SignalingHub<C: Clock = SystemClock> {
    codes: CodeRegistry,
    pairs: PairRegistry,
    presence: PresenceDirectory,
    clock: C,
}

impl SignalingHub<SystemClock> {
    /// Hub on the system clock with the given code lifetime.
    pub fn new(code_ttl: Duration) -> Self {
        Self::with_registries(
            CodeRegistry::new(code_ttl),
            PairRegistry::new(),
            PresenceDirectory::new(),
            SystemClock,
        )
    }
}

impl Default for SignalingHub<SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_TTL)
    }
}

impl<C: Clock> SignalingHub<C> {
    /// Assembles a hub from explicitly constructed parts.
    pub fn with_registries(
        codes: CodeRegistry,
        pairs: PairRegistry,
        presence: PresenceDirectory,
        clock: C,
    ) -> Self {
        Self {
            codes,
            pairs,
            presence,
            clock,
        }
    }

    pub fn codes(&self) -> &CodeRegistry {
        &self.codes
    }

    pub fn pairs(&self) -> &PairRegistry {
        &self.pairs
    }

    pub fn presence(&self) -> &PresenceDirectory {
        &self.presence
    }

    /// Lifecycle state of `identity`, derived from the registries.
    pub fn peer_state(&self, identity: &PeerIdentity) -> PeerState {
        if let Some(partner) = self.pairs.partner_of(identity) {
            return PeerState::Paired {
                partner: partner.clone(),
                online: self.presence.is_online(identity),
            };
        }
        match self.codes.code_of(identity) {
            Some(code) if !code.consumed => PeerState::CodeIssued {
                code: code.code.clone(),
            },
            _ => PeerState::Unpaired,
        }
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Processes one message received on `conn`.
    ///
    /// A failed precondition is answered with an `error` message to `conn`,
    /// except for unauthorized ICE candidates which are dropped silently.
    pub fn handle(&mut self, conn: ConnectionId, msg: ClientMessage) -> Vec<Effect> {
        let mut out = Outbox::default();
        let kind = msg.kind();

        let result = match msg {
            ClientMessage::Register { identity, role } => {
                self.register(conn, &identity, role, &mut out)
            }
            ClientMessage::GenerateCode { identity } => {
                self.generate_code(conn, &identity, &mut out)
            }
            ClientMessage::ConnectWithCode { code, identity } => {
                self.connect_with_code(conn, &code, &identity, &mut out)
            }
            ClientMessage::RestoreConnection { identity, role } => {
                self.restore_connection(conn, &identity, role, &mut out)
            }
            ClientMessage::BreakPair { identity } => self.break_pair(conn, &identity, &mut out),
            ClientMessage::CheckPairStatus { identity } => {
                self.check_pair_status(conn, &identity, &mut out)
            }
            ClientMessage::Offer { target, payload } => {
                self.relay(conn, SignalKind::Offer, &target, payload, &mut out)
            }
            ClientMessage::Answer { target, payload } => {
                self.relay(conn, SignalKind::Answer, &target, payload, &mut out)
            }
            ClientMessage::IceCandidate { target, payload } => {
                self.relay(conn, SignalKind::IceCandidate, &target, payload, &mut out)
            }
        };

        if let Err(e) = result {
            debug!("conn {conn}: {kind} refused: {e}");
            out.deliver(
                conn,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            );
        }
        out.effects
    }

    /// Processes the loss of connection `conn`.
    ///
    /// The pair (if any) is untouched; the partner hears `partner-offline`.
    /// An unconsumed code owned by the departing identity is withdrawn.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Effect> {
        let mut out = Outbox::default();
        if let Some(identity) = self.presence.unbind(conn) {
            info!("{identity} went offline (conn {conn})");
            self.went_offline(&identity, &mut out);
        }
        out.effects
    }

    /// Deferred expiry for one issuance.  A no-op if the code was consumed,
    /// replaced, or already removed by another path.
    pub fn expire_code(&mut self, code: &str, serial: u64) -> Vec<Effect> {
        let mut out = Outbox::default();
        if let Some(lapsed) = self.codes.expire(code, serial) {
            self.code_lapsed(lapsed, &mut out);
        }
        out.effects
    }

    /// Periodic sweep: removes every unconsumed code past its window.
    pub fn sweep(&mut self) -> Vec<Effect> {
        let mut out = Outbox::default();
        let now = self.clock.now_ms();
        let lapsed = self.codes.sweep(now);
        if !lapsed.is_empty() {
            debug!("sweep removed {} lapsed code(s)", lapsed.len());
        }
        for code in lapsed {
            self.code_lapsed(code, &mut out);
        }
        out.effects
    }

    // ── Operations ────────────────────────────────────────────────────────────

    fn register(
        &mut self,
        conn: ConnectionId,
        identity: &str,
        role: Role,
        out: &mut Outbox,
    ) -> Result<(), SignalError> {
        let identity = PeerIdentity::parse(identity)?;
        self.bind(conn, &identity, role, out);
        Ok(())
    }

    fn generate_code(
        &mut self,
        conn: ConnectionId,
        identity: &str,
        out: &mut Outbox,
    ) -> Result<(), SignalError> {
        let owner = self.ensure_bound(conn, identity, Role::Camera, out)?;
        if self.pairs.is_paired(&owner) {
            return Err(SignalError::AlreadyPaired);
        }

        let issued = self.codes.issue(&owner, self.clock.now_ms())?;
        if let Some(old) = &issued.replaced {
            out.cancel(old);
        }
        out.schedule(&issued.code, self.codes.ttl());
        info!("issued code {} to {owner}", issued.code.code);

        out.deliver(
            conn,
            ServerMessage::CodeGenerated {
                code: issued.code.code.clone(),
                expires_at: issued.code.expires_at_ms,
            },
        );
        Ok(())
    }

    fn connect_with_code(
        &mut self,
        conn: ConnectionId,
        code: &str,
        identity: &str,
        out: &mut Outbox,
    ) -> Result<(), SignalError> {
        let claimant = self.ensure_bound(conn, identity, Role::Viewer, out)?;

        // The code is judged before the claimant: a paired claimant holding a
        // valid code is refused by `pair` and the claim is released.
        let now = self.clock.now_ms();
        if let Some(lapsed) = self.codes.remove_lapsed(code, now) {
            self.code_lapsed(lapsed, out);
            return Err(SignalError::InvalidOrExpiredCode);
        }

        let owner = self.codes.claim(code, &claimant, now)?;
        if let Err(e) = self.pairs.pair(&owner, &claimant) {
            self.codes.release(code);
            return Err(e);
        }
        if let Some(consumed) = self.codes.finish(code) {
            out.cancel(&consumed);
        }
        // A claimant that had issued its own code is no longer eligible to be
        // paired through it.
        if let Some(own) = self.codes.revoke_owner(&claimant) {
            out.cancel(&own);
        }
        info!("paired {owner} (camera) with {claimant} (viewer)");

        out.notify(
            &self.presence,
            &owner,
            ServerMessage::Paired {
                paired_with: claimant.clone(),
                role: Role::Camera,
            },
        );
        out.deliver(
            conn,
            ServerMessage::Paired {
                paired_with: owner,
                role: Role::Viewer,
            },
        );
        Ok(())
    }

    fn restore_connection(
        &mut self,
        conn: ConnectionId,
        identity: &str,
        role: Role,
        out: &mut Outbox,
    ) -> Result<(), SignalError> {
        let identity = PeerIdentity::parse(identity)?;
        let role = self.pairs.role_of(&identity).unwrap_or(role);
        self.bind(conn, &identity, role, out);

        let partner = self
            .pairs
            .partner_of(&identity)
            .cloned()
            .ok_or(SignalError::NoActivePair)?;
        out.deliver(
            conn,
            ServerMessage::ConnectionRestored {
                paired_with: partner,
                role,
            },
        );
        Ok(())
    }

    fn break_pair(
        &mut self,
        conn: ConnectionId,
        identity: &str,
        out: &mut Outbox,
    ) -> Result<(), SignalError> {
        let identity = self.ensure_bound(conn, identity, Role::Viewer, out)?;
        let partner = self.pairs.break_pair(&identity)?;
        info!("{identity} broke pair with {partner}");

        out.deliver(conn, ServerMessage::PairBroken {});
        out.notify(&self.presence, &partner, ServerMessage::PairBroken {});
        Ok(())
    }

    fn check_pair_status(
        &mut self,
        conn: ConnectionId,
        identity: &str,
        out: &mut Outbox,
    ) -> Result<(), SignalError> {
        let identity = self.ensure_bound(conn, identity, Role::Viewer, out)?;
        let status = match self.pairs.partner_of(&identity) {
            Some(partner) => ServerMessage::PairStatus {
                has_pair: true,
                paired_with: Some(partner.clone()),
                partner_online: Some(self.presence.is_online(partner)),
            },
            None => ServerMessage::PairStatus {
                has_pair: false,
                paired_with: None,
                partner_online: None,
            },
        };
        out.deliver(conn, status);
        Ok(())
    }

    fn relay(
        &mut self,
        conn: ConnectionId,
        kind: SignalKind,
        target: &str,
        payload: Value,
        out: &mut Outbox,
    ) -> Result<(), SignalError> {
        match self.route(conn, target) {
            Ok(Some((sender, to))) => {
                debug!("relaying {} {sender} -> conn {to}", kind.as_str());
                out.deliver(to, kind.forward(sender, payload));
                Ok(())
            }
            Ok(None) => {
                debug!("dropping {} for offline target {target}", kind.as_str());
                Ok(())
            }
            Err(e) if kind.fails_silently() => {
                debug!("conn {conn}: ignoring {}: {e}", kind.as_str());
                Ok(())
            }
            Err(e) => {
                warn!("conn {conn}: {} to {target} refused: {e}", kind.as_str());
                Err(e)
            }
        }
    }

    /// Resolves the sender from the connection binding, never from the message.
    fn route(
        &self,
        conn: ConnectionId,
        target: &str,
    ) -> Result<Option<(PeerIdentity, ConnectionId)>, SignalError> {
        let sender = self
            .presence
            .identity_of(conn)
            .ok_or(SignalError::NotRegistered)?;
        let target = PeerIdentity::parse(target).map_err(|_| SignalError::UnauthorizedTarget)?;
        let to = SignalingRelay::new(&self.pairs, &self.presence).route(sender, &target)?;
        Ok(to.map(|to| (sender.clone(), to)))
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Binds `identity` to `conn` and tells the partner it is online.
    fn bind(&mut self, conn: ConnectionId, identity: &PeerIdentity, role: Role, out: &mut Outbox) {
        let binding = self.presence.bind(identity, conn, role);
        if let Some(old) = binding.replaced {
            debug!("{identity} moved from conn {old} to conn {conn}");
        }
        if let Some(previous) = binding.detached {
            info!("{previous} went offline (conn {conn} switched identity)");
            self.went_offline(&previous, out);
        }
        info!("{identity} online as {role} (conn {conn})");

        if let Some(partner) = self.pairs.partner_of(identity) {
            out.notify(
                &self.presence,
                partner,
                ServerMessage::PartnerOnline {
                    identity: identity.clone(),
                },
            );
        }
    }

    /// Makes sure `conn` speaks for `identity`, binding it on first use.
    fn ensure_bound(
        &mut self,
        conn: ConnectionId,
        identity: &str,
        default_role: Role,
        out: &mut Outbox,
    ) -> Result<PeerIdentity, SignalError> {
        let identity = PeerIdentity::parse(identity)?;
        match self.presence.identity_of(conn) {
            Some(bound) if bound == &identity => Ok(identity),
            Some(_) => Err(SignalError::IdentityMismatch),
            None => {
                let role = self.pairs.role_of(&identity).unwrap_or(default_role);
                self.bind(conn, &identity, role, out);
                Ok(identity)
            }
        }
    }

    /// `identity` no longer has a connection.  The pair survives; the partner
    /// hears `partner-offline` and an unconsumed code of `identity` is
    /// withdrawn.
    fn went_offline(&mut self, identity: &PeerIdentity, out: &mut Outbox) {
        if let Some(partner) = self.pairs.partner_of(identity) {
            out.notify(
                &self.presence,
                partner,
                ServerMessage::PartnerOffline {
                    identity: identity.clone(),
                },
            );
        }
        if let Some(code) = self.codes.revoke_owner(identity) {
            debug!("withdrew code {} of departed {identity}", code.code);
            out.cancel(&code);
        }
    }

    /// Single funnel for every expiry path, so the owner hears exactly one
    /// `code-expired` per lapsed code.
    fn code_lapsed(&self, code: PairingCode, out: &mut Outbox) {
        info!("code {} of {} expired", code.code, code.owner);
        out.cancel(&code);
        out.notify(&self.presence, &code.owner, ServerMessage::CodeExpired {});
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::MockClock;
    use crate::domain::ManualClock;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    const T0: u64 = 1_700_000_000_000;

    fn id(s: &str) -> PeerIdentity {
        PeerIdentity::parse(s).unwrap()
    }

    fn make_hub() -> (SignalingHub<ManualClock>, ManualClock) {
        let clock = ManualClock::new(T0);
        let hub = SignalingHub::with_registries(
            CodeRegistry::with_rng(DEFAULT_CODE_TTL, StdRng::seed_from_u64(11)),
            PairRegistry::new(),
            PresenceDirectory::new(),
            clock.clone(),
        );
        (hub, clock)
    }

    fn send<C: Clock>(
        hub: &mut SignalingHub<C>,
        conn: ConnectionId,
        msg: serde_json::Value,
    ) -> Vec<Effect> {
        let msg: ClientMessage = serde_json::from_value(msg).unwrap();
        hub.handle(conn, msg)
    }

    fn delivered(effects: &[Effect], to: ConnectionId) -> Vec<ServerMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Deliver { to: t, message } if *t == to => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn deliveries(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Deliver { .. }))
            .count()
    }

    fn error_text(err: SignalError) -> ServerMessage {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }

    fn issued_code(effects: &[Effect], to: ConnectionId) -> String {
        delivered(effects, to)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::CodeGenerated { code, .. } => Some(code),
                _ => None,
            })
            .expect("code-generated delivered")
    }

    /// Camera `cam` on `c1` paired with viewer `viewer` on `c2`.
    fn paired_hub() -> (SignalingHub<ManualClock>, ManualClock, ConnectionId, ConnectionId) {
        let (mut hub, clock) = make_hub();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        send(&mut hub, c2, json!({"type":"connect-with-code","code":code,"identity":"viewer"}));
        assert!(hub.pairs().is_paired(&id("cam")));
        (hub, clock, c1, c2)
    }

    // ── CodeRegistry through the hub ──────────────────────────────────────────

    #[test]
    fn test_generate_code_replies_and_schedules_expiry() {
        // Arrange: a hub whose clock is pinned with mockall
        let mut clock = MockClock::new();
        clock.expect_now_ms().return_const(T0);
        let mut hub = SignalingHub::with_registries(
            CodeRegistry::with_rng(DEFAULT_CODE_TTL, StdRng::seed_from_u64(3)),
            PairRegistry::new(),
            PresenceDirectory::new(),
            clock,
        );
        let conn = ConnectionId::new();

        // Act
        let fx = send(&mut hub, conn, json!({"type":"generate-code","identity":"cam"}));

        // Assert
        let code = issued_code(&fx, conn);
        assert!(fx.contains(&Effect::Deliver {
            to: conn,
            message: ServerMessage::CodeGenerated {
                code: code.clone(),
                expires_at: T0 + 300_000,
            },
        }));
        assert!(fx.contains(&Effect::ScheduleExpiry {
            code: code.clone(),
            serial: hub.codes().get(&code).unwrap().serial,
            after: Duration::from_secs(300),
        }));
        assert_eq!(hub.peer_state(&id("cam")), PeerState::CodeIssued { code });
        assert_eq!(hub.presence().handle_of(&id("cam")), Some(conn));
    }

    #[test]
    fn test_generate_code_again_cancels_previous_timer() {
        let (mut hub, _clock) = make_hub();
        let conn = ConnectionId::new();
        send(&mut hub, conn, json!({"type":"generate-code","identity":"cam"}));
        let first_serial = hub.codes().code_of(&id("cam")).unwrap().serial;

        let fx = send(&mut hub, conn, json!({"type":"generate-code","identity":"cam"}));

        assert!(fx.contains(&Effect::CancelExpiry { serial: first_serial }));
        assert_eq!(hub.codes().len(), 1);
    }

    #[test]
    fn test_generate_code_when_paired_is_refused() {
        let (mut hub, _clock, c1, _c2) = paired_hub();

        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));

        assert_eq!(delivered(&fx, c1), vec![error_text(SignalError::AlreadyPaired)]);
        assert!(hub.codes().is_empty());
    }

    #[test]
    fn test_redeem_pairs_both_sides() {
        let (mut hub, _clock) = make_hub();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        let serial = hub.codes().get(&code).unwrap().serial;

        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":code,"identity":"viewer"}),
        );

        assert_eq!(
            delivered(&fx, c1),
            vec![ServerMessage::Paired {
                paired_with: id("viewer"),
                role: Role::Camera
            }]
        );
        assert_eq!(
            delivered(&fx, c2),
            vec![ServerMessage::Paired {
                paired_with: id("cam"),
                role: Role::Viewer
            }]
        );
        assert!(fx.contains(&Effect::CancelExpiry { serial }));
        assert!(hub.codes().is_empty());
        assert!(hub.pairs().is_symmetric());
    }

    #[test]
    fn test_code_is_single_use() {
        let (mut hub, _clock) = make_hub();
        let (c1, c2, c3) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        send(&mut hub, c2, json!({"type":"connect-with-code","code":code,"identity":"viewer"}));

        let fx = send(
            &mut hub,
            c3,
            json!({"type":"connect-with-code","code":code,"identity":"intruder"}),
        );

        assert_eq!(
            delivered(&fx, c3),
            vec![error_text(SignalError::InvalidOrExpiredCode)]
        );
        assert_eq!(hub.pairs().partner_of(&id("cam")), Some(&id("viewer")));
        assert!(!hub.pairs().is_paired(&id("intruder")));
    }

    #[test]
    fn test_redeem_after_window_fails_and_notifies_owner_once() {
        let (mut hub, clock) = make_hub();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        let serial = hub.codes().get(&code).unwrap().serial;
        clock.advance(Duration::from_millis(300_001));

        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":code,"identity":"viewer"}),
        );

        assert_eq!(
            delivered(&fx, c2),
            vec![error_text(SignalError::InvalidOrExpiredCode)]
        );
        assert_eq!(delivered(&fx, c1), vec![ServerMessage::CodeExpired {}]);

        // The timer and the sweep arriving later find nothing to do.
        assert!(hub.expire_code(&code, serial).is_empty());
        assert!(hub.sweep().is_empty());
    }

    #[test]
    fn test_expiry_timer_removes_unused_code_once() {
        let (mut hub, _clock) = make_hub();
        let c1 = ConnectionId::new();
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        let serial = hub.codes().get(&code).unwrap().serial;

        let fx = hub.expire_code(&code, serial);

        assert_eq!(delivered(&fx, c1), vec![ServerMessage::CodeExpired {}]);
        assert_eq!(hub.peer_state(&id("cam")), PeerState::Unpaired);
        assert!(hub.expire_code(&code, serial).is_empty());
    }

    #[test]
    fn test_expiry_timer_after_redemption_is_noop() {
        let (mut hub, _clock) = make_hub();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        let serial = hub.codes().get(&code).unwrap().serial;
        send(&mut hub, c2, json!({"type":"connect-with-code","code":code,"identity":"viewer"}));

        assert!(hub.expire_code(&code, serial).is_empty());
        assert!(hub.pairs().is_paired(&id("cam")));
    }

    #[test]
    fn test_sweep_expires_lapsed_codes() {
        let (mut hub, clock) = make_hub();
        let c1 = ConnectionId::new();
        send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));

        assert!(hub.sweep().is_empty());
        clock.advance(Duration::from_secs(301));
        let fx = hub.sweep();

        assert_eq!(delivered(&fx, c1), vec![ServerMessage::CodeExpired {}]);
        assert!(hub.codes().is_empty());
    }

    #[test]
    fn test_redeeming_claimant_loses_its_own_code() {
        let (mut hub, _clock) = make_hub();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        send(&mut hub, c2, json!({"type":"generate-code","identity":"other-cam"}));
        let own_serial = hub.codes().code_of(&id("other-cam")).unwrap().serial;

        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":code,"identity":"other-cam"}),
        );

        assert!(fx.contains(&Effect::CancelExpiry { serial: own_serial }));
        assert!(hub.codes().is_empty());
    }

    #[test]
    fn test_redeeming_own_code_is_refused() {
        let (mut hub, _clock) = make_hub();
        let c1 = ConnectionId::new();
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);

        let fx = send(
            &mut hub,
            c1,
            json!({"type":"connect-with-code","code":code,"identity":"cam"}),
        );

        assert_eq!(delivered(&fx, c1), vec![error_text(SignalError::SelfPairing)]);
        assert!(!hub.codes().get(&code).unwrap().consumed);
    }

    #[test]
    fn test_paired_claimant_cannot_redeem() {
        let (mut hub, _clock, _c1, c2) = paired_hub();
        let c3 = ConnectionId::new();
        let fx = send(&mut hub, c3, json!({"type":"generate-code","identity":"cam-2"}));
        let code = issued_code(&fx, c3);

        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":code,"identity":"viewer"}),
        );

        assert_eq!(delivered(&fx, c2), vec![error_text(SignalError::AlreadyPaired)]);
        assert!(!hub.codes().get(&code).unwrap().consumed);
    }

    #[test]
    fn test_paired_claimant_with_bad_code_hears_about_the_code() {
        let (mut hub, clock, _c1, c2) = paired_hub();
        let c3 = ConnectionId::new();
        let fx = send(&mut hub, c3, json!({"type":"generate-code","identity":"cam-2"}));
        let code = issued_code(&fx, c3);

        // Unknown code.
        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":"99999","identity":"viewer"}),
        );
        assert_eq!(
            delivered(&fx, c2),
            vec![error_text(SignalError::InvalidOrExpiredCode)]
        );

        // Lapsed code: removed on the spot and its owner told once.
        clock.advance(Duration::from_secs(301));
        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":code,"identity":"viewer"}),
        );
        assert_eq!(
            delivered(&fx, c2),
            vec![error_text(SignalError::InvalidOrExpiredCode)]
        );
        assert_eq!(delivered(&fx, c3), vec![ServerMessage::CodeExpired {}]);
        assert!(hub.codes().get(&code).is_none());
    }

    // ── Presence ──────────────────────────────────────────────────────────────

    #[test]
    fn test_disconnect_keeps_pair_and_tells_partner() {
        let (mut hub, _clock, c1, c2) = paired_hub();

        let fx = hub.disconnect(c2);

        assert_eq!(
            delivered(&fx, c1),
            vec![ServerMessage::PartnerOffline {
                identity: id("viewer")
            }]
        );
        assert_eq!(hub.pairs().partner_of(&id("cam")), Some(&id("viewer")));
        assert_eq!(
            hub.peer_state(&id("viewer")),
            PeerState::Paired {
                partner: id("cam"),
                online: false
            }
        );
    }

    #[test]
    fn test_restore_connection_after_reconnect() {
        let (mut hub, _clock, c1, c2) = paired_hub();
        hub.disconnect(c2);
        let c3 = ConnectionId::new();

        let fx = send(
            &mut hub,
            c3,
            json!({"type":"restore-connection","identity":"viewer","role":"viewer"}),
        );

        assert_eq!(
            delivered(&fx, c3),
            vec![ServerMessage::ConnectionRestored {
                paired_with: id("cam"),
                role: Role::Viewer
            }]
        );
        assert_eq!(
            delivered(&fx, c1),
            vec![ServerMessage::PartnerOnline {
                identity: id("viewer")
            }]
        );
    }

    #[test]
    fn test_restore_connection_uses_pair_role_over_claimed_role() {
        let (mut hub, _clock, _c1, c2) = paired_hub();
        hub.disconnect(c2);
        let c3 = ConnectionId::new();

        let fx = send(
            &mut hub,
            c3,
            json!({"type":"restore-connection","identity":"viewer","role":"camera"}),
        );

        assert_eq!(
            delivered(&fx, c3),
            vec![ServerMessage::ConnectionRestored {
                paired_with: id("cam"),
                role: Role::Viewer
            }]
        );
    }

    #[test]
    fn test_restore_connection_without_pair_is_error() {
        let (mut hub, _clock) = make_hub();
        let conn = ConnectionId::new();

        let fx = send(
            &mut hub,
            conn,
            json!({"type":"restore-connection","identity":"loner","role":"viewer"}),
        );

        assert_eq!(delivered(&fx, conn), vec![error_text(SignalError::NoActivePair)]);
        assert!(hub.presence().is_online(&id("loner")));
    }

    #[test]
    fn test_stale_disconnect_after_rebind_is_ignored() {
        let (mut hub, _clock, _c1, c2) = paired_hub();
        let c3 = ConnectionId::new();
        send(&mut hub, c3, json!({"type":"register","identity":"viewer","role":"viewer"}));

        let fx = hub.disconnect(c2);

        assert!(fx.is_empty());
        assert_eq!(hub.presence().handle_of(&id("viewer")), Some(c3));
    }

    #[test]
    fn test_disconnect_withdraws_unconsumed_code() {
        let (mut hub, _clock) = make_hub();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam"}));
        let code = issued_code(&fx, c1);
        let serial = hub.codes().get(&code).unwrap().serial;

        let fx = hub.disconnect(c1);
        assert_eq!(fx, vec![Effect::CancelExpiry { serial }]);

        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":code,"identity":"viewer"}),
        );
        assert_eq!(
            delivered(&fx, c2),
            vec![error_text(SignalError::InvalidOrExpiredCode)]
        );
    }

    #[test]
    fn test_connection_cannot_speak_for_another_identity() {
        let (mut hub, _clock) = make_hub();
        let conn = ConnectionId::new();
        send(&mut hub, conn, json!({"type":"register","identity":"cam","role":"camera"}));

        let fx = send(&mut hub, conn, json!({"type":"break-pair","identity":"someone-else"}));

        assert_eq!(delivered(&fx, conn), vec![error_text(SignalError::IdentityMismatch)]);
    }

    #[test]
    fn test_invalid_identity_is_reported() {
        let (mut hub, _clock) = make_hub();
        let conn = ConnectionId::new();

        let fx = send(&mut hub, conn, json!({"type":"generate-code","identity":"  "}));

        assert!(matches!(
            delivered(&fx, conn).as_slice(),
            [ServerMessage::Error { message }] if message.starts_with("invalid identity")
        ));
    }

    // ── Relay ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_offer_reaches_partner_with_sender() {
        let (mut hub, _clock, c1, c2) = paired_hub();
        let sdp = json!({"type":"offer","sdp":"v=0"});

        let fx = send(&mut hub, c2, json!({"type":"offer","target":"cam","payload":sdp}));

        assert_eq!(
            fx,
            vec![Effect::Deliver {
                to: c1,
                message: ServerMessage::Offer {
                    from: id("viewer"),
                    payload: sdp
                }
            }]
        );
    }

    #[test]
    fn test_answer_and_candidates_flow_back() {
        let (mut hub, _clock, c1, c2) = paired_hub();

        let fx = send(
            &mut hub,
            c1,
            json!({"type":"answer","target":"viewer","payload":{"sdp":"v=0"}}),
        );
        assert_eq!(delivered(&fx, c2).len(), 1);

        let fx = send(
            &mut hub,
            c1,
            json!({"type":"ice-candidate","target":"viewer","payload":{"candidate":"x"}}),
        );
        assert!(matches!(
            delivered(&fx, c2).as_slice(),
            [ServerMessage::IceCandidate { from, .. }] if from == &id("cam")
        ));
    }

    #[test]
    fn test_offer_to_non_partner_is_unauthorized_and_not_delivered() {
        let (mut hub, _clock, c1, c2) = paired_hub();
        let stranger = ConnectionId::new();
        send(&mut hub, stranger, json!({"type":"register","identity":"stranger","role":"viewer"}));

        let fx = send(&mut hub, stranger, json!({"type":"offer","target":"cam","payload":{}}));

        assert_eq!(fx.len(), 1);
        assert_eq!(
            delivered(&fx, stranger),
            vec![error_text(SignalError::UnauthorizedTarget)]
        );
        assert!(delivered(&fx, c1).is_empty());
        assert!(delivered(&fx, c2).is_empty());
    }

    #[test]
    fn test_unauthorized_ice_candidate_is_silent() {
        let (mut hub, _clock, c1, _c2) = paired_hub();
        send(&mut hub, c1, json!({"type":"break-pair","identity":"cam"}));

        let fx = send(&mut hub, c1, json!({"type":"ice-candidate","target":"viewer","payload":{}}));

        assert!(fx.is_empty());
    }

    #[test]
    fn test_signal_from_unregistered_connection_is_refused() {
        let (mut hub, _clock, _c1, _c2) = paired_hub();
        let anon = ConnectionId::new();

        let fx = send(&mut hub, anon, json!({"type":"offer","target":"cam","payload":{}}));
        assert_eq!(delivered(&fx, anon), vec![error_text(SignalError::NotRegistered)]);

        let fx = send(&mut hub, anon, json!({"type":"ice-candidate","target":"cam","payload":{}}));
        assert!(fx.is_empty());
    }

    #[test]
    fn test_signal_to_offline_partner_is_dropped() {
        let (mut hub, _clock, c1, c2) = paired_hub();
        hub.disconnect(c1);

        let fx = send(&mut hub, c2, json!({"type":"offer","target":"cam","payload":{}}));

        assert_eq!(deliveries(&fx), 0);
    }

    // ── Pair lifecycle ────────────────────────────────────────────────────────

    #[test]
    fn test_break_pair_notifies_both_then_reports_no_pair() {
        let (mut hub, _clock, c1, c2) = paired_hub();

        let fx = send(&mut hub, c1, json!({"type":"break-pair","identity":"cam"}));
        assert_eq!(delivered(&fx, c1), vec![ServerMessage::PairBroken {}]);
        assert_eq!(delivered(&fx, c2), vec![ServerMessage::PairBroken {}]);

        let fx = send(&mut hub, c1, json!({"type":"break-pair","identity":"cam"}));
        assert_eq!(delivered(&fx, c1), vec![error_text(SignalError::NoActivePair)]);
        assert!(delivered(&fx, c2).is_empty());
    }

    #[test]
    fn test_check_pair_status_reports_partner_presence() {
        let (mut hub, _clock, c1, c2) = paired_hub();

        let fx = send(&mut hub, c1, json!({"type":"check-pair-status","identity":"cam"}));
        assert_eq!(
            delivered(&fx, c1),
            vec![ServerMessage::PairStatus {
                has_pair: true,
                paired_with: Some(id("viewer")),
                partner_online: Some(true),
            }]
        );

        hub.disconnect(c2);
        let fx = send(&mut hub, c1, json!({"type":"check-pair-status","identity":"cam"}));
        assert_eq!(
            delivered(&fx, c1),
            vec![ServerMessage::PairStatus {
                has_pair: true,
                paired_with: Some(id("viewer")),
                partner_online: Some(false),
            }]
        );
    }

    #[test]
    fn test_register_of_paired_identity_announces_online() {
        let (mut hub, _clock, c1, c2) = paired_hub();
        hub.disconnect(c1);
        let c3 = ConnectionId::new();

        let fx = send(&mut hub, c3, json!({"type":"register","identity":"cam","role":"camera"}));

        assert_eq!(
            delivered(&fx, c2),
            vec![ServerMessage::PartnerOnline { identity: id("cam") }]
        );
        assert!(delivered(&fx, c3).is_empty());
    }

    #[test]
    fn test_switching_identity_on_a_connection_takes_old_one_offline() {
        let (mut hub, _clock, c1, c2) = paired_hub();

        let fx = send(&mut hub, c2, json!({"type":"register","identity":"new-me","role":"viewer"}));

        assert_eq!(
            delivered(&fx, c1),
            vec![ServerMessage::PartnerOffline {
                identity: id("viewer")
            }]
        );
        assert!(!hub.presence().is_online(&id("viewer")));
    }

    #[test]
    fn test_switching_identity_withdraws_old_identity_code() {
        let (mut hub, _clock) = make_hub();
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());
        let fx = send(&mut hub, c1, json!({"type":"generate-code","identity":"cam-x"}));
        let code = issued_code(&fx, c1);
        let serial = hub.codes().get(&code).unwrap().serial;

        let fx = send(&mut hub, c1, json!({"type":"register","identity":"cam-z","role":"camera"}));

        assert_eq!(fx, vec![Effect::CancelExpiry { serial }]);
        assert!(!hub.presence().is_online(&id("cam-x")));
        assert_eq!(hub.peer_state(&id("cam-x")), PeerState::Unpaired);

        let fx = send(
            &mut hub,
            c2,
            json!({"type":"connect-with-code","code":code,"identity":"viewer"}),
        );
        assert_eq!(
            delivered(&fx, c2),
            vec![error_text(SignalError::InvalidOrExpiredCode)]
        );
        assert!(!hub.pairs().is_paired(&id("cam-x")));
    }
}
