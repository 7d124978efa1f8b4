#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipatch::vcdiff::inspect;

fuzz_target!(|data: &[u8]| {
    let _ = inspect::inspect(data);
    let _ = inspect::instructions(data);
});
