#![no_main]

use idmap_axml::AxmlParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(mut parser) = AxmlParser::new(data) else {
        return;
    };

    while let Ok(Some(_)) = parser.next_event() {}
});
