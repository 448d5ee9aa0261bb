#![no_main]
use core::convert::TryFrom;
use libfuzzer_sys::fuzz_target;
use twinshare::Share;

fuzz_target!(|data: &[u8]| {
    if let Ok(share) = Share::try_from(data) {
        assert_eq!(Vec::from(&share), data);
    }
});
