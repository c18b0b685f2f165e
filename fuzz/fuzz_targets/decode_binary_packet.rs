#![no_main]

use bytes::BytesMut;
use dmtp_codec::DmtpCodec;
use dmtp_protocol::Encoding;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = DmtpCodec::new();
    codec.set_encoding(Encoding::Binary);
    let mut buf = BytesMut::from(data);

    // Drain every frame the buffer yields; a malformed tail must error,
    // never panic.
    while !buf.is_empty() {
        match codec.decode(&mut buf) {
            Ok(Some(_packet)) => continue,
            Ok(None) | Err(_) => break,
        }
    }
});
