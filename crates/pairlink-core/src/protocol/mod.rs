//! Protocol module: the JSON message catalog and its text-frame codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_client_message, encode_server_message, ProtocolError, MAX_FRAME_BYTES};
pub use messages::{ClientMessage, ServerMessage};
