//! Print wire vectors for interop testing against other SecretD peers.
//!
//! Run with: cargo run --package secretd-protocol --example test_vectors

use ciborium::Value;
use secretd_protocol::cbor::to_cbor;
use secretd_protocol::framing::encode_frame;
use secretd_protocol::messages::{ClientHello, Request};
use secretd_protocol::{CipherSuite, StaticKeyAuthProvider, NEGOTIATION_DATA};

fn main() -> secretd_protocol::Result<()> {
    println!("protocol: {}", CipherSuite::default().protocol_name());

    // Negotiation frame sent before the first handshake message
    print_vector("negotiation_frame", &encode_frame(NEGOTIATION_DATA)?);

    // Request [0, 0, "hello", [1]]
    let request = Request {
        sequence: 0,
        method: "hello",
        body: &vec![1u64],
    };
    print_vector("request_hello", &to_cbor(&request)?);

    // Responses are produced by the server; these mirror what it sends
    let success = (1u8, 0u64, Value::Null, vec![2u64]);
    print_vector("response_success", &to_cbor(&success)?);

    let failure = (1u8, 0u64, "error", Value::Null);
    print_vector("response_error", &to_cbor(&failure)?);

    // Client hello with a fixed timestamp
    let hello = ClientHello {
        timestamp: 1_704_067_200_000_000_000,
        auth_method: StaticKeyAuthProvider::METHOD.to_string(),
        auth_params: Value::Null,
    };
    print_vector("client_hello", &to_cbor(&hello)?);

    Ok(())
}

fn print_vector(name: &str, bytes: &[u8]) {
    println!("{}: {}", name, hex::encode(bytes));
}
