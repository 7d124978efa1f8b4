#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipatch::vcdiff::{DecoderOptions, VcdiffDecoder};

fuzz_target!(|data: &[u8]| {
    // The decoder must never panic, only return errors.
    let decoder = VcdiffDecoder::with_options(DecoderOptions {
        max_target_file_size: 1 << 22,
        max_target_window_size: 1 << 22,
        ..Default::default()
    });
    let _ = decoder.decode(&[], data);

    // Also fuzz with a non-empty dictionary.
    if data.len() >= 2 {
        let split = data.len() / 2;
        let (dictionary, delta) = data.split_at(split);
        let _ = decoder.decode(dictionary, delta);
    }
});
