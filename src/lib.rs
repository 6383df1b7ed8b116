//! A store-and-forward message relay. Clients associate with the relay, push bounded-size opaque
//!  payloads into other clients' inboxes, and poll their own inbox to pick up messages.
//!
//! Every request is a self-contained datagram that is answered with exactly one response, see
//!  [frame] for the envelope and [relay::dispatcher::Dispatcher] for the protocol's state machine.

pub mod client;
pub mod frame;
pub mod relay;
pub mod transport;
pub mod util;
pub mod test_util;
