//! Fuzz target for transfer frame decoding.
//!
//! Arbitrary frames must never panic the decoder or the receiver.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use peerlink_transfer::{TransferConfig, TransferReceiver};

fuzz_target!(|data: &[u8]| {
    let frame = Bytes::copy_from_slice(data);
    let Ok(message) = peerlink_protocol::decode_any(&frame) else {
        return;
    };

    // Anything that decodes must re-encode.
    let _ = message.encode();

    let mut receiver = TransferReceiver::new(TransferConfig::default());
    let _ = receiver.handle(message);
});
