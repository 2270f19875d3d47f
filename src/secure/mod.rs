//! Secure aggregation channel.
//!
//! Per-node key material with symmetric encode/decode of contributions.

pub mod channel;

pub use channel::{
    bytes_to_vector, key_fingerprint, positional_node_id, vector_to_bytes, ChannelCodec,
    XorChannelCodec, ELEMENT_WIDTH, KEY_LEN,
};
