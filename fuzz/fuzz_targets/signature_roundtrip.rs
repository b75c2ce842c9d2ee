#![no_main]

use libfuzzer_sys::fuzz_target;
use rpcmple::Signature;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let (sig_len, rest) = data.split_at(1);
    let sig_len = (sig_len[0] as usize) % 8 + 1;
    if rest.len() < sig_len {
        return;
    }
    let (sig_bytes, body) = rest.split_at(sig_len);

    let tags: String = sig_bytes.iter().map(|&b| b as char).collect();
    let Ok(sig) = Signature::parse(&tags) else {
        return;
    };

    let mut cursor = std::io::Cursor::new(body);
    if let Ok(values) = sig.from_binary(&mut cursor) {
        let encoded = sig.to_binary_vec(&values).expect("decoded values must re-encode");
        let mut cursor2 = std::io::Cursor::new(encoded.as_slice());
        let values2 = sig.from_binary(&mut cursor2).expect("re-encoded bytes must re-decode");
        assert_eq!(values, values2);
    }
});
