use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use idmap::idmap::NO_ENTRY;
use idmap::{Idmap, IdmapHeader, IdmapJson};

pub(crate) fn command_inspect(path: &Path, json: bool) -> Result<()> {
    let idmap = match Idmap::read(path) {
        Ok(idmap) => idmap,
        Err(e) => {
            // show what is there before reporting the broken mapping section
            if !json {
                if let Ok(header) = IdmapHeader::read(path) {
                    print_header(&header);
                }
            }
            return Err(e).with_context(|| format!("can't read idmap: {:?}", path));
        }
    };

    if json {
        let output = serde_json::to_string_pretty(&IdmapJson::from(&idmap))
            .context("can't serialize idmap")?;
        println!("{}", output);
        return Ok(());
    }

    print_header(&idmap.header);
    println!(
        "{}: 0x{:02x}",
        "Target Package Id", idmap.payload.target_package_id
    );

    println!("\n{}:", "Type Mappings".blue().bold());
    for block in &idmap.payload.types {
        println!(
            "  type 0x{:02x} -> 0x{:02x} ({} entries)",
            block.target_type_id,
            block.overlay_type_id,
            block.entries.len()
        );

        for (i, &entry) in block.entries.iter().enumerate() {
            let target_entry = block.entry_offset as usize + i;
            if entry == NO_ENTRY {
                println!("    0x{:04x} -> {}", target_entry, "-".dimmed());
            } else {
                println!("    0x{:04x} -> 0x{:04x}", target_entry, entry);
            }
        }
    }

    Ok(())
}

fn print_header(header: &IdmapHeader) {
    println!("{}: 0x{:08x}", "Magic", header.magic);
    println!("{}: 0x{:08x}", "Version", header.version);
    println!(
        "{}: {} (crc 0x{:08x})",
        "Target",
        header.target_path().display().to_string().green(),
        header.target_crc32
    );
    println!(
        "{}: {} (crc 0x{:08x})",
        "Overlay",
        header.overlay_path().display().to_string().green(),
        header.overlay_crc32
    );
}
