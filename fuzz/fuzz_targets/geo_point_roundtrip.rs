#![no_main]

use arbitrary::Arbitrary;
use dmtp_protocol::GpsPoint;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzPoint {
    latitude: f64,
    longitude: f64,
}

fuzz_target!(|input: FuzzPoint| {
    let point = GpsPoint::new(input.latitude, input.longitude);

    // Neither resolution should panic, including on NaN/infinite input.
    let standard = point.encode_standard();
    let _ = GpsPoint::decode_standard(&standard);

    let high = point.encode_high();
    let decoded_high = GpsPoint::decode_high(&high);

    // High resolution is linear, unclamped fixed-point: within its
    // representable range it round-trips to within one 1e-7 step.
    const HIGH_RANGE: f64 = i32::MAX as f64 / 10_000_000.0;
    if input.latitude.abs() < HIGH_RANGE && input.longitude.abs() < HIGH_RANGE {
        assert!((decoded_high.latitude - point.latitude).abs() < 1e-6);
        assert!((decoded_high.longitude - point.longitude).abs() < 1e-6);
    }
});
