#![no_main]

use dmtp_protocol::Fletcher16;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut fletcher = Fletcher16::new();
    fletcher.update(data);
    let (f0, f1) = fletcher.checksum();
    assert!(fletcher.is_valid(f0, f1));

    // Byte-at-a-time feeding must match the bulk path.
    let mut byte_by_byte = Fletcher16::new();
    for &b in data {
        byte_by_byte.update_byte(b);
    }
    assert_eq!(byte_by_byte.checksum(), (f0, f1));
});
