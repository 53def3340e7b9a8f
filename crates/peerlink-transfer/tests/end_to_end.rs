//! Sender to receiver over an in-process channel.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use peerlink_protocol::{chunk_header_len, decode_any, TransferMessage, TransferMetadata};
use peerlink_transfer::{
    checksum, ChannelDispatcher, CompletedTransfer, CompressionLevel, OutgoingTransfer,
    ReceiveOutcome, ReceiverState, ReplicationHandler, TransferConfig, TransferError,
    TransferReceiver, TransferSender, TransferSink,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Peer {
    replication: Mutex<Vec<Bytes>>,
    completed: Mutex<Vec<CompletedTransfer>>,
    failed: Mutex<Vec<(String, String)>>,
}

impl ReplicationHandler for Peer {
    fn handle(&self, frame: Bytes) {
        self.replication.lock().push(frame);
    }
}

impl TransferSink for Peer {
    fn on_complete(&self, transfer: CompletedTransfer) {
        self.completed.lock().push(transfer);
    }

    fn on_failed(&self, export_id: &str, error: &TransferError) {
        self.failed
            .lock()
            .push((export_id.to_string(), error.to_string()));
    }
}

fn metadata() -> TransferMetadata {
    TransferMetadata {
        source_platform: "cli".into(),
        source_session_id: "session-7".into(),
        destination: "browser".into(),
        created_at: 1_700_000_000_000,
    }
}

#[tokio::test]
async fn test_hello_world_three_chunks() {
    let payload = b"hello world!";
    let config = TransferConfig {
        max_message_size: chunk_header_len("abc") + 4,
        ..TransferConfig::default()
    };
    let outgoing = OutgoingTransfer::from_compressed(
        "abc",
        metadata(),
        Bytes::from_static(payload),
        payload.len() as u64,
    );
    let mut sender = TransferSender::new(outgoing, &config).unwrap();
    assert_eq!(sender.total_chunks(), 3);
    assert_eq!(sender.checksum(), checksum(payload));

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    sender.send(&tx).await.unwrap();
    drop(tx);

    let mut receiver = TransferReceiver::new(config);
    let mut outcome = None;
    while let Some(frame) = rx.recv().await {
        let message = decode_any(&frame).unwrap();
        if let TransferMessage::Chunk(chunk) = &message {
            assert_eq!(chunk.data.len(), 4);
        }
        if let Some(result) = receiver.handle(message) {
            outcome = Some(result);
        }
    }

    match outcome {
        Some(ReceiveOutcome::Completed(done)) => {
            assert_eq!(&done.payload[..], payload);
            assert_eq!(done.export_id, "abc");
            assert_eq!(done.metadata, metadata());
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(receiver.state(), ReceiverState::Complete);
}

#[tokio::test]
async fn test_compressed_transfer_through_dispatcher() {
    let raw: Vec<u8> = (0..20_000u32)
        .flat_map(|i| format!("message {i}: the quick brown fox\n").into_bytes())
        .collect();
    let config = TransferConfig {
        max_message_size: 1024,
        ..TransferConfig::default()
    };

    let outgoing =
        OutgoingTransfer::from_raw("export-42", metadata(), &raw, CompressionLevel::Fast).unwrap();
    let mut sender = TransferSender::new(outgoing, &config).unwrap();
    assert!(sender.total_chunks() > 1);

    let peer = Arc::new(Peer::default());
    let dispatcher = ChannelDispatcher::new(config, peer.clone(), peer.clone());
    let (tx, rx) = mpsc::channel::<Bytes>(16);
    let cancel = CancellationToken::new();
    let pump = tokio::spawn(dispatcher.run(rx, cancel.clone()));

    // Replication traffic shares the channel.
    let replication = Bytes::from_static(&[0x02, 0xAA, 0xBB]);
    tx.send(replication.clone()).await.unwrap();
    sender.send(&tx).await.unwrap();
    tx.send(replication.clone()).await.unwrap();
    drop(tx);
    pump.await.unwrap();

    let completed = peer.completed.lock();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].decompress().unwrap(), raw);
    assert_eq!(*peer.replication.lock(), vec![replication.clone(), replication]);
    assert!(peer.failed.lock().is_empty());
}

#[tokio::test]
async fn test_corrupted_chunk_rejected() {
    let payload = Bytes::from_static(b"0123456789abcdefghij");
    let config = TransferConfig {
        max_message_size: chunk_header_len("bad") + 4,
        ..TransferConfig::default()
    };
    let outgoing = OutgoingTransfer::from_compressed("bad", metadata(), payload.clone(), 20);
    let mut sender = TransferSender::new(outgoing, &config).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    sender.send(&tx).await.unwrap();
    drop(tx);

    let peer = Arc::new(Peer::default());
    let mut dispatcher = ChannelDispatcher::new(config, peer.clone(), peer.clone());
    let mut n = 0;
    while let Some(frame) = rx.recv().await {
        // Flip the last byte of the third frame, the second chunk.
        let frame = if n == 2 {
            let mut bytes = frame.to_vec();
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
            Bytes::from(bytes)
        } else {
            frame
        };
        dispatcher.dispatch(frame);
        n += 1;
    }

    assert!(peer.completed.lock().is_empty());
    let failed = peer.failed.lock();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "bad");
    assert!(failed[0].1.contains("checksum mismatch"));
    assert_eq!(dispatcher.receiver_state(), ReceiverState::Failed);
}

#[tokio::test]
async fn test_back_to_back_transfers() {
    let config = TransferConfig::default();
    let peer = Arc::new(Peer::default());
    let mut dispatcher = ChannelDispatcher::new(config.clone(), peer.clone(), peer.clone());

    for (id, body) in [("first", &b"one"[..]), ("second", &b"two"[..])] {
        let outgoing =
            OutgoingTransfer::from_raw(id, metadata(), body, CompressionLevel::Default).unwrap();
        let mut sender = TransferSender::new(outgoing, &config).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        sender.send(&tx).await.unwrap();
        drop(tx);
        while let Some(frame) = rx.recv().await {
            dispatcher.dispatch(frame);
        }
    }

    let completed = peer.completed.lock();
    let ids: Vec<_> = completed.iter().map(|t| t.export_id.as_str()).collect();
    assert_eq!(ids, ["first", "second"]);
    assert_eq!(completed[1].decompress().unwrap(), b"two");
}
