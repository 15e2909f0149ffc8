#![no_main]

use idmap_zip::ZipEntry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(zip) = ZipEntry::new(data.to_vec()) else {
        return;
    };

    let names: Vec<String> = zip.namelist().map(str::to_owned).collect();
    for name in names {
        let _ = zip.crc32(&name);
        let _ = zip.read(&name);
    }
});
