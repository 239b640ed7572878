//! Unicast and broadcast delivery over the session table.
//!
//! Sends never block and never retry. A failed send marks that one session
//! broken and raises the cleanup flag; a broadcast always attempts every
//! remaining recipient.

use log::{debug, warn};
use shared::ServerPacket;

use crate::error::SendError;
use crate::session::{SessionId, SessionTable};

impl SessionTable {
    /// Sends one packet to one session. Returns whether it was queued.
    pub fn unicast(&mut self, id: SessionId, packet: ServerPacket) -> bool {
        let Some(session) = self.get_mut(id) else {
            return false;
        };

        match session.deliver(packet) {
            Ok(()) => true,
            Err(SendError::NotStable) => false,
            Err(e) => {
                warn!("Send to session {} failed: {}", id, e);
                self.needs_cleanup = true;
                false
            }
        }
    }

    /// Sends one packet to every stable session except `except`. Returns the
    /// number of sessions it was queued for.
    pub fn broadcast(&mut self, packet: &ServerPacket, except: Option<SessionId>) -> usize {
        debug!(
            "Broadcast packet {:#04x} to {} sessions except {:?}",
            packet.tag(),
            self.len(),
            except
        );

        let mut delivered = 0;
        let mut faulted = false;
        for session in self.iter_mut().filter(|session| Some(session.id) != except) {
            match session.deliver(packet.clone()) {
                Ok(()) => delivered += 1,
                Err(SendError::NotStable) => {}
                Err(e) => {
                    warn!("Broadcast to session {} failed: {}", session.id, e);
                    faulted = true;
                }
            }
        }

        if faulted {
            self.needs_cleanup = true;
        }
        delivered
    }
}
