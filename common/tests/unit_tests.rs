use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use common::constants::{MAX_PACKET_PAYLOAD, PACKET_HEADER_SIZE};
use common::error::{ApiError, ErrorKind};
use common::packet::{Packet, PacketCodec, PacketError, PacketType};
use common::schemas::{
    FileCreatedRequest, NewFileInfo, Reply, ReplyStatus, Request, ResourceSpec, TransferType,
};

fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random::<u8>()).collect()
}

#[test]
fn test_packet_roundtrip_random_sizes() {
    let mut rng = rand::rng();
    let mut sizes = vec![0, 1, MAX_PACKET_PAYLOAD];
    sizes.extend((0..8).map(|_| rng.random_range(0..=MAX_PACKET_PAYLOAD)));

    for size in sizes {
        let payload = random_payload(size);
        let packet = Packet::new(PacketType::FileChunk, 7, 9, "node1", "node2", payload.clone())
            .unwrap();

        let encoded = packet.encode().unwrap();
        assert_eq!(encoded.len(), PACKET_HEADER_SIZE + size);

        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded.payload.as_ref(), payload.as_slice());
        assert_eq!(decoded.header, packet.header);
    }
}

#[test]
fn test_corrupted_payload_fails_checksum() {
    let payload = random_payload(1024);
    let packet = Packet::new(PacketType::FileChunk, 1, 1, "node1", "node2", payload).unwrap();

    let mut raw = packet.encode().unwrap().to_vec();
    let idx = PACKET_HEADER_SIZE + 512;
    raw[idx] ^= 0xff;

    assert!(matches!(
        Packet::decode(&raw),
        Err(PacketError::ChecksumMismatch)
    ));
}

#[test]
fn test_oversized_payload_rejected() {
    let payload = vec![0u8; MAX_PACKET_PAYLOAD + 1];
    let res = Packet::new(PacketType::FileChunk, 0, 1, "a", "b", payload);
    assert!(matches!(res, Err(PacketError::PayloadTooLarge { .. })));
}

#[test]
fn test_truncated_and_length_mismatch() {
    let packet = Packet::new(PacketType::Control, 0, 1, "a", "b", vec![1, 2, 3]).unwrap();
    let raw = packet.encode().unwrap();

    assert!(matches!(
        Packet::decode(&raw[..PACKET_HEADER_SIZE - 1]),
        Err(PacketError::Truncated { .. })
    ));
    assert!(matches!(
        Packet::decode(&raw[..raw.len() - 1]),
        Err(PacketError::LengthMismatch {
            declared: 3,
            actual: 2
        })
    ));
}

#[test]
fn test_codec_drops_corrupt_frame_and_keeps_going() {
    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::new();

    let good1 = Packet::new(PacketType::Heartbeat, 1, 1, "n1", "coord", vec![1u8; 16]).unwrap();
    let bad = Packet::new(PacketType::Heartbeat, 2, 1, "n1", "coord", vec![2u8; 16]).unwrap();
    let good2 = Packet::new(PacketType::Heartbeat, 3, 1, "n1", "coord", vec![3u8; 16]).unwrap();

    codec.encode(good1, &mut buf).unwrap();
    let bad_start = buf.len();
    codec.encode(bad, &mut buf).unwrap();
    // flip the last payload byte of the second frame
    let bad_end = buf.len();
    buf[bad_end - 1] ^= 0x01;
    assert!(bad_end > bad_start);
    codec.encode(good2, &mut buf).unwrap();

    let first = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(first.header.sequence_number, 1);

    let second = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(second.header.sequence_number, 3);
    assert_eq!(codec.discarded(), 1);

    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn test_codec_waits_for_partial_frame() {
    let mut codec = PacketCodec::new();
    let mut full = BytesMut::new();
    let packet = Packet::new(PacketType::FileChunk, 5, 1, "a", "b", random_payload(300)).unwrap();
    codec.encode(packet.clone(), &mut full).unwrap();

    let mut partial = full.split_to(100);
    assert!(codec.decode(&mut partial).unwrap().is_none());

    partial.unsplit(full);
    let decoded = codec.decode(&mut partial).unwrap().unwrap();
    assert_eq!(decoded.payload, packet.payload);
}

#[tokio::test]
async fn test_codec_over_a_stream() {
    let (client, server) = tokio::io::duplex(256 * 1024);
    let mut sink = FramedWrite::new(client, PacketCodec::new());
    let mut stream = FramedRead::new(server, PacketCodec::new());

    for seq in 0..4u32 {
        let payload = random_payload(10_000);
        let packet = Packet::new(PacketType::FileChunk, seq, 4, "src", "dst", payload).unwrap();
        sink.send(packet).await.unwrap();
    }
    drop(sink);

    let mut seqs = Vec::new();
    while let Some(packet) = stream.next().await {
        seqs.push(packet.unwrap().header.sequence_number);
    }
    assert_eq!(seqs, vec![0, 1, 2, 3]);
}

#[test]
fn test_request_tagged_by_action() {
    let raw = r#"{
        "action": "FILE_CREATED",
        "node_id": "node1",
        "file_info": {
            "file_id": "f1",
            "file_name": "report.bin",
            "file_size": 52428800,
            "owner_node": "node1",
            "file_path": "node_storage_node1/report.bin"
        }
    }"#;

    let req: Request = serde_json::from_str(raw).unwrap();
    let Request::FileCreated(FileCreatedRequest { node_id, file_info }) = req else {
        panic!("expected FILE_CREATED");
    };
    assert_eq!(node_id, "node1");
    assert_eq!(
        file_info,
        NewFileInfo {
            file_id: "f1".into(),
            file_name: "report.bin".into(),
            file_size: 50 * 1024 * 1024,
            owner_node: "node1".into(),
            chunk_size: None,
            file_path: Some("node_storage_node1/report.bin".into()),
        }
    );
}

#[test]
fn test_unknown_action_is_a_parse_error() {
    let raw = r#"{"action": "SELF_DESTRUCT", "node_id": "node1"}"#;
    let err: ApiError = serde_json::from_str::<Request>(raw).unwrap_err().into();
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[test]
fn test_register_with_missing_resources_parses_but_fails_validation() {
    let raw = r#"{"action": "REGISTER", "node_id": "node1", "resources": {"cpu_cores": 4}}"#;
    let Request::Register(reg) = serde_json::from_str::<Request>(raw).unwrap() else {
        panic!("expected REGISTER");
    };
    assert_eq!(reg.host, "localhost");
    assert_eq!(reg.port, 0);

    let err = reg.resources.validate().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("memory_gb"));

    assert!(ResourceSpec::default().validate().is_err());
}

#[test]
fn test_transfer_complete_defaults() {
    let raw = r#"{"action": "TRANSFER_COMPLETE", "node_id": "node2", "file_id": "f1"}"#;
    let Request::TransferComplete(tc) = serde_json::from_str::<Request>(raw).unwrap() else {
        panic!("expected TRANSFER_COMPLETE");
    };
    assert_eq!(tc.transfer_type, TransferType::Unknown);
    assert!(tc.success);
    assert!(tc.duration_secs.is_none());

    let raw = r#"{"action": "TRANSFER_COMPLETE", "node_id": "node2", "transfer_type": "sideways"}"#;
    let Request::TransferComplete(tc) = serde_json::from_str::<Request>(raw).unwrap() else {
        panic!("expected TRANSFER_COMPLETE");
    };
    assert_eq!(tc.transfer_type, TransferType::Unknown);
    assert!(tc.file_id.is_none());
}

#[test]
fn test_error_reply_shape() {
    let reply = Reply::from_error(&ApiError::NotFound("File not found".into()));
    let json = serde_json::to_value(&reply).unwrap();

    assert_eq!(json["status"], "ERROR");
    assert_eq!(json["error"], "File not found");
    assert_eq!(json["kind"], "not_found");
    assert!(json.get("files").is_none());

    let ack = serde_json::to_value(Reply::ack()).unwrap();
    assert_eq!(ack, serde_json::json!({"status": "ACK"}));

    let back: Reply = serde_json::from_value(json).unwrap();
    assert_eq!(back.status, ReplyStatus::Error);
}
