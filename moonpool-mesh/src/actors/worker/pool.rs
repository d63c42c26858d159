//! Live sockets of one worker, grouped by client.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::actors::types::{ClientId, SessionId};
use crate::websocket::ServerSocket;

/// ClientId → sockets that client currently holds on this worker.
#[derive(Debug, Default)]
pub(crate) struct SessionPool {
    sessions: BTreeMap<ClientId, Vec<(SessionId, Rc<ServerSocket>)>>,
}

impl SessionPool {
    pub(crate) fn insert(&mut self, client: ClientId, session: SessionId, socket: Rc<ServerSocket>) {
        self.sessions
            .entry(client)
            .or_default()
            .push((session, socket));
    }

    /// Remove one socket. Returns whether the client has none left.
    ///
    /// A client with a single socket (or none tracked) loses its entry.
    pub(crate) fn remove(&mut self, client: &ClientId, session: SessionId) -> bool {
        match self.sessions.get_mut(client) {
            Some(sockets) if sockets.len() > 1 => {
                sockets.retain(|(id, _)| *id != session);
                false
            }
            _ => {
                self.sessions.remove(client);
                true
            }
        }
    }

    /// Sockets held by `client`.
    pub(crate) fn sockets_of(&self, client: &ClientId) -> Vec<Rc<ServerSocket>> {
        self.sessions
            .get(client)
            .map(|sockets| sockets.iter().map(|(_, socket)| socket.clone()).collect())
            .unwrap_or_default()
    }

    /// Every socket, optionally skipping those of `excluded`.
    pub(crate) fn sockets_except(&self, excluded: Option<&ClientId>) -> Vec<Rc<ServerSocket>> {
        self.sessions
            .iter()
            .filter(|(client, _)| Some(*client) != excluded)
            .flat_map(|(_, sockets)| sockets.iter().map(|(_, socket)| socket.clone()))
            .collect()
    }

    pub(crate) fn count(&self, client: &ClientId) -> usize {
        self.sessions.get(client).map_or(0, Vec::len)
    }
}
