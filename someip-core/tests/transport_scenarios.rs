//! End-to-end scenarios spanning more than one module, the way spec §8 describes them: a real
//! TCP request/response exchange, a TP message segmented by one engine and reassembled by
//! another, and a TCP connection tripping its error threshold on genuinely malformed input.

use mio::net::{TcpListener, TcpStream};
use someip_core::header::{
    SomeIpHeader, E_OK, E_UNKNOWN_SERVICE, MSG_TYPE_REQUEST, SOMEIP_HEADER_SIZE,
};
use someip_core::router::{PacketRouter, RouteOutcome};
use someip_core::tcp::TcpConnection;
use someip_core::tp::{ReassemblyOutcome, TpReassembler, TpSegmenter};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn encode(header: &SomeIpHeader, payload: &[u8]) -> Vec<u8> {
    let mut wire = vec![0u8; SOMEIP_HEADER_SIZE];
    header.encode(&mut wire).unwrap();
    wire.extend_from_slice(payload);
    wire
}

fn request_header(service_id: u16, method_id: u16) -> SomeIpHeader {
    SomeIpHeader {
        service_id,
        method_id,
        length: 8,
        client_id: 0x42,
        session_id: 0x01,
        protocol_version: 1,
        interface_version: 1,
        message_type: MSG_TYPE_REQUEST,
        return_code: E_OK,
    }
}

/// A request for a service nobody provides arrives over a real loopback TCP connection; the
/// router produces the spec §4.9 error response, which is sent back and read off the wire by
/// the original caller.
#[test]
fn unroutable_request_over_tcp_gets_an_error_response() {
    let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listen_addr = listener.local_addr().unwrap();

    let mut client_stream = TcpStream::connect(listen_addr).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let (server_stream, peer_addr) = listener.accept().unwrap();
    let mut server = TcpConnection::new(peer_addr, 65536, 1 << 20, 0, 0);
    server.accept(server_stream);

    let request = request_header(0xBEEF, 0x0001);
    let wire = encode(&request, &[]);
    std::io::Write::write_all(&mut client_stream, &wire).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let now = Instant::now();
    let messages = server.on_readable(now).unwrap();
    assert_eq!(messages.len(), 1);

    let router: PacketRouter<SocketAddr> = PacketRouter::new();
    let outcome = router.route_inbound(&messages[0].header);
    let code = match outcome {
        RouteOutcome::Unroutable(code) => code,
        _ => panic!("expected an unroutable outcome for an unregistered service"),
    };
    assert_eq!(code, E_UNKNOWN_SERVICE);

    let response = PacketRouter::<SocketAddr>::error_response(&messages[0].header, code).unwrap();
    server.send(encode(&response, &[])).unwrap();
    server.on_writable(now).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    let mut buf = [0u8; SOMEIP_HEADER_SIZE];
    std::io::Read::read_exact(&mut client_stream, &mut buf).unwrap();
    let decoded = SomeIpHeader::decode(&buf).unwrap();
    assert_eq!(decoded.request_id(), request.request_id());
    assert_eq!(decoded.message_type, 0x81);
    assert_eq!(decoded.return_code, E_UNKNOWN_SERVICE);
}

/// A message too large for one segment is cut up by `TpSegmenter` and fed, in order, straight
/// into a `TpReassembler` — confirming the two engines agree on offsets and the `more` flag
/// without either one knowing about the other's internals.
#[test]
fn segmented_message_reassembles_to_the_original_payload() {
    let segmenter = TpSegmenter::new(52, 1 << 16).unwrap(); // reserved 12, effective payload 32
    let header = request_header(0x1122, 0x8001);
    let payload: Vec<u8> = (0..100u32).map(|b| (b % 256) as u8).collect();

    let segments = segmenter.segment(&header, &payload).unwrap();
    assert!(segments.len() > 1, "payload must actually need more than one segment");

    let mut reassembler: TpReassembler<&str> = TpReassembler::new(4, 1 << 16);
    let mut complete = None;
    for segment in &segments {
        let outcome = reassembler
            .feed("peer-a", segment.header, segment.tp, &segment.payload)
            .unwrap();
        if let ReassemblyOutcome::Complete(out_header, body) = outcome {
            complete = Some((out_header, body));
        }
    }

    let (out_header, body) = complete.expect("final segment must complete the assembly");
    assert!(!out_header.is_tp());
    assert_eq!(out_header.service_id, header.service_id);
    assert_eq!(out_header.method_id, header.method_id);
    assert_eq!(body, payload);
}

/// Repeated malformed frames on a real TCP connection trip the error threshold, matching spec
/// §4.7's "disconnect after N consecutive invalid messages" behavior end to end (framing ->
/// threshold bookkeeping), rather than just the threshold counter in isolation.
#[test]
fn repeated_malformed_frames_trip_the_error_threshold_over_a_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listen_addr = listener.local_addr().unwrap();

    let mut client_stream = TcpStream::connect(listen_addr).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let (server_stream, peer_addr) = listener.accept().unwrap();

    let mut server = TcpConnection::new(peer_addr, 65536, 1 << 20, 2, 10);
    server.accept(server_stream);

    // A length field below LENGTH_FIELD_TAIL (8) is a malformed header.
    let mut garbage = vec![0u8; SOMEIP_HEADER_SIZE];
    garbage[4..8].copy_from_slice(&1u32.to_be_bytes());

    let mut tripped = false;
    for _ in 0..3 {
        std::io::Write::write_all(&mut client_stream, &garbage).unwrap();
        std::thread::sleep(Duration::from_millis(15));
        let now = Instant::now();
        let result = server.on_readable(now);
        if server.record_outcome(&result) {
            tripped = true;
            break;
        }
    }

    assert!(tripped, "connection should disconnect after consecutive malformed frames");
}
