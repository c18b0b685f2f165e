#![no_main]

use bytes::BytesMut;
use dmtp_codec::DmtpCodec;
use dmtp_protocol::Encoding;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Exercise both the checksummed and bare text framing; the hex
    // encoding is the bootstrap default a real session pins to before
    // ever seeing `ERROR_PACKET_ENCODING`.
    for encoding in [Encoding::Hex, Encoding::HexCksum] {
        let mut codec = DmtpCodec::new();
        codec.set_encoding(encoding);
        let mut buf = BytesMut::from(data);

        loop {
            match codec.decode(&mut buf) {
                Ok(Some(_packet)) => continue,
                Ok(None) | Err(_) => break,
            }
        }
    }
});
