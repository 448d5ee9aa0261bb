#![no_main]
use libfuzzer_sys::fuzz_target;

use twinshare::{CapsuleCodec, CapsuleConfig, Key, Vault};

fuzz_target!(|data: &[u8]| {
    let config = CapsuleConfig::default();
    if let Ok(codec) = CapsuleCodec::new(config.clone()) {
        let _capsule = codec.decode(data);
    }
    if let Ok(vault) = Vault::new(config) {
        let _plaintext = vault.decrypt(data, &Key::from_bytes([0x11; 32]));
    }
});
