//! Network layer for datagram ingestion.
//!
//! - **Interface selection** ([`interface`]): picks the local interface a
//!   multicast group is joined on, honoring a caller hint.
//!
//! - **Socket management** ([`multicast`]): one UDP socket per connection,
//!   bound, tuned and subscribed to its group. Leaving the group is tied to
//!   the socket's lifetime.

pub mod interface;
pub mod multicast;

pub use multicast::MulticastSocket;
