//! Control paths multiplexed through the actors' `fetch` entry point.

/// A control message addressed to an actor rather than to user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlRoute {
    /// Router → worker: remember the sender as a neighbor.
    Neighbor,
    /// Worker → worker: emit the body to local sockets.
    Broadcast,
    /// Worker → worker: deliver the body to the target client if hosted here.
    Whisper,
    /// Worker → worker: answer through the gossip hook.
    Gossip,
    /// Worker → router: a session ended, release one unit of capacity.
    Close,
    /// Front code → router: which worker hosts this client?
    Identify,
}

impl ControlRoute {
    /// Every control route, in declaration order.
    pub const ALL: [ControlRoute; 6] = [
        ControlRoute::Neighbor,
        ControlRoute::Broadcast,
        ControlRoute::Whisper,
        ControlRoute::Gossip,
        ControlRoute::Close,
        ControlRoute::Identify,
    ];

    /// The request path for this route.
    pub const fn path(self) -> &'static str {
        match self {
            ControlRoute::Neighbor => "/~mesh~/neighbor",
            ControlRoute::Broadcast => "/~mesh~/broadcast",
            ControlRoute::Whisper => "/~mesh~/whisper",
            ControlRoute::Gossip => "/~mesh~/gossip",
            ControlRoute::Close => "/~mesh~/close",
            ControlRoute::Identify => "/~mesh~/identify",
        }
    }

    /// Classify a request path. `None` means client traffic.
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|route| route.path() == path)
    }

    /// Short name used in logs and diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            ControlRoute::Neighbor => "neighbor-introduce",
            ControlRoute::Broadcast => "broadcast-relay",
            ControlRoute::Whisper => "whisper-relay",
            ControlRoute::Gossip => "gossip-relay",
            ControlRoute::Close => "close-notify",
            ControlRoute::Identify => "identify",
        }
    }
}
