#![no_main]

use idmap::Idmap;
use idmap::header::HeaderBuffer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(idmap) = Idmap::parse(data) else {
        return;
    };

    let Ok(bytes) = idmap.to_bytes() else {
        return;
    };
    let header = HeaderBuffer::from_slice(&bytes).and_then(|x| x.parse());
    assert_eq!(header.as_ref(), Ok(&idmap.header));
    let _ = Idmap::parse(&bytes);
});
