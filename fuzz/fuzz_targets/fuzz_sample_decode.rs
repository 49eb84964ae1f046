#![no_main]
use libfuzzer_sys::fuzz_target;
use resotrack_traits::wire::{self, Frame, FRAME_LEN};

fuzz_target!(|data: &[u8]| {
    let volts = wire::decode_samples(data);
    assert_eq!(volts.len(), data.len() / 2);
    assert!(volts.iter().all(|v| v.is_finite() && *v >= 0.0));

    if let Ok(bytes) = <[u8; FRAME_LEN]>::try_from(data) {
        let frame = Frame::decode(&bytes);
        assert_eq!(frame.encode(), bytes);
    }
});
