//! The frame model: the request / response envelope exchanged between clients and the relay.
//!
//! There are two layers. A [raw_frame::RawFrame] is what a datagram decodes to, a bag of tagged
//!  fields with self-describing value types. [frame_model::Request::parse] validates such a bag
//!  against the fields required for its frame type and message code, producing a typed request
//!  or a [frame_model::MalformedFrame].

pub mod frame_model;
pub mod raw_frame;
