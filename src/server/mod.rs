//! UDP query interface.
//!
//! Peers send one text command per datagram (`count`, `length`, `dips`, `history`,
//! `help`, `stop`); an empty datagram repeats the peer's previous command. See
//! [`protocol`] for the reply formats.

pub mod protocol;
pub mod session;
pub mod udp;

pub use protocol::{Command, HELP_TEXT, MAX_DATAGRAM};
pub use session::{Session, SessionTable};
pub use udp::{answer, QueryServer, Reply};
