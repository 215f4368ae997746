//! Tests for the transport layer
//!
//! These tests run codec output through a real loopback connection, the
//! way client and server use the two together.

#[cfg(test)]
mod tests {
    use crate::protocol::{CallRequest, CallResponse};
    use crate::transport::{Connection, JsonCodec, LineCodec, DEFAULT_CONNECT_TIMEOUT};
    use serde_json::json;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_request_response_cycle_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = Connection::from_stream(stream).unwrap();
            let line = conn.read_line().unwrap().unwrap();
            let request = JsonCodec.decode_request(&line).unwrap().unwrap();
            let sum: i64 = request
                .arguments
                .iter()
                .map(|v| v.as_i64().unwrap())
                .sum();
            let reply = JsonCodec.encode_response(&CallResponse::plain(json!(sum))).unwrap();
            conn.write_line(&reply).unwrap();
        });

        let mut conn = Connection::connect(addr, DEFAULT_CONNECT_TIMEOUT).unwrap();
        let request = CallRequest::new("Add", vec![json!(4), json!(1)]);
        conn.write_line(&JsonCodec.encode_request(&request).unwrap()).unwrap();

        let line = conn.read_line().unwrap().unwrap();
        let response = JsonCodec.decode_response(&line).unwrap().unwrap();
        assert_eq!(response, CallResponse::plain(json!(5)));

        server.join().unwrap();
    }

    #[test]
    fn test_peer_addr_is_recorded() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap());

        let conn = Connection::connect(addr, DEFAULT_CONNECT_TIMEOUT).unwrap();
        let (_stream, client_addr) = accept.join().unwrap();

        assert_eq!(conn.peer_addr(), addr);
        assert_ne!(client_addr.port(), addr.port());
    }
}
