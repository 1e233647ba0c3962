//! Protocol module for framing and dispatching messages.
//!
//! This module contains the implementations for:
//! - Line-delimited frame encoding, decoding and classification
//! - Routing of classified frames to registered handlers

pub mod dispatch;
pub mod frame;

pub use dispatch::{typed_pair, Delivery, Dispatcher};
pub use frame::{
    classify, decode, encode, encode_json, encode_text, Classified, FrameBuffer, OutboundMessage,
    FRAME_DELIMITER,
};
