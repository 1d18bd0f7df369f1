#![no_main]

use dotweave::{CilAssembly, Weaver, WeaverConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(mut assembly) = CilAssembly::from_mem(data.to_vec(), None) {
        let weaver = Weaver::new(WeaverConfig::isolating());
        if weaver.weave(&mut assembly).is_ok() {
            let _ = assembly.to_bytes();
        }
    }
});
