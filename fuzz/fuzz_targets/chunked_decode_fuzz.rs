#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipatch::vcdiff::{DecoderOptions, StreamingDecoder, VcdiffDecoder};

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // First byte: chunk size. Second byte: dictionary length.
    let chunk = usize::from(data[0]).max(1);
    let dict_len = usize::from(data[1]).min(data.len() - 2);
    let (dictionary, delta) = data[2..].split_at(dict_len);
    let options = DecoderOptions {
        max_target_file_size: 1 << 22,
        max_target_window_size: 1 << 22,
        ..Default::default()
    };

    let mut decoder = StreamingDecoder::with_options(options.clone());
    let mut out = Vec::new();
    decoder.start_decoding(dictionary).unwrap();
    let chunked = delta
        .chunks(chunk)
        .try_for_each(|c| decoder.decode_chunk(c, &mut out))
        .and_then(|()| decoder.finish_decoding());

    // Chunk boundaries must not change the outcome.
    let whole = VcdiffDecoder::with_options(options).decode(dictionary, delta);
    match (chunked, whole) {
        (Ok(()), Ok(target)) => assert_eq!(out, target),
        (Err(_), Err(_)) => {}
        (a, b) => panic!("chunked {a:?} vs whole {:?}", b.map(|t| t.len())),
    }
});
