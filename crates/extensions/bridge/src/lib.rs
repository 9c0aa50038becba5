mod bridge;
mod peer;
mod state;

pub use bridge::Bridge;
pub use state::PeerState;
