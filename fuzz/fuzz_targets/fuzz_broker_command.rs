//! Fuzz target for broker message handling.

#![no_main]

use libfuzzer_sys::fuzz_target;
use peerlink_broker::{Broker, ClientCommand};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = ClientCommand::parse(text);

    let broker = Broker::default();
    if let Ok((connection, _rx)) = broker.connect() {
        broker.handle_message(&connection, text);
        broker.close(&connection);
        assert_eq!(broker.stats().topics, 0);
    }
});
