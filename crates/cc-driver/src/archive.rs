//! Minimal System V/GNU `ar` reader for `.a` static libraries.
//!
//! Only what the linker needs is supported: listing member names and
//! extracting their bytes. Thin archives and BSD long-name encoding are not
//! handled, only the GNU `//`/`/N` long-name-table convention.

use std::path::Path;

use anyhow::{bail, Context, Result};

const MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;

pub struct Member {
    pub name: String,
    pub data: Vec<u8>,
}

pub fn read_archive(path: &Path) -> Result<Vec<Member>> {
    let data = std::fs::read(path).with_context(|| format!("reading archive {}", path.display()))?;
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        bail!("{}: not an archive (bad magic)", path.display());
    }

    let mut members = Vec::new();
    let mut long_names: Vec<u8> = Vec::new();
    let mut offset = MAGIC.len();

    while offset + HEADER_LEN <= data.len() {
        let header = &data[offset..offset + HEADER_LEN];
        let name_field = std::str::from_utf8(&header[0..16]).unwrap_or("").trim_end().to_string();
        let size_field = std::str::from_utf8(&header[48..58]).unwrap_or("").trim().to_string();
        let size: usize = size_field.parse().with_context(|| format!("{}: malformed member size", path.display()))?;

        let body_start = offset + HEADER_LEN;
        let body_end = body_start + size;
        if body_end > data.len() {
            bail!("{}: truncated member", path.display());
        }
        let body = data[body_start..body_end].to_vec();

        if name_field == "//" {
            long_names = body;
        } else if name_field == "/" {
            // Symbol table (archive index); the linker re-derives symbols
            // from each member's own object anyway, so it's skipped.
        } else if let Some(index) = name_field.strip_prefix('/').and_then(|s| s.parse::<usize>().ok()) {
            let slice = &long_names[index.min(long_names.len())..];
            let end = slice.iter().position(|&b| b == b'/').unwrap_or(slice.len());
            members.push(Member { name: String::from_utf8_lossy(&slice[..end]).into_owned(), data: body });
        } else {
            members.push(Member { name: name_field.trim_end_matches('/').to_string(), data: body });
        }

        offset = body_end + (size % 2);
    }
    Ok(members)
}
