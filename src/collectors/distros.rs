//! Distribution listing through `wsl.exe -l -v`.
//!
//! `wsl.exe` writes its own messages as UTF-16LE regardless of the console
//! code page, so the raw bytes are decoded explicitly.

use std::time::Duration;

use super::{CollectorError, require_success, run_query};
use crate::health::types::DistroState;

const WSL: &str = "wsl.exe";
const DEFAULT_MARKER: char = '*';
const BOM: char = '\u{feff}';

/// Decodes `wsl.exe` output. Falls back to UTF-8 when the bytes hold no
/// NUL at all, which is what `WSL_UTF8=1` produces.
pub fn decode_output(bytes: &[u8]) -> String {
    let text = if bytes.contains(&0) {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };
    text.trim_start_matches(BOM).replace('\0', "")
}

fn parse_line(line: &str) -> Option<DistroState> {
    let line = line.trim();
    let (is_default, rest) = match line.strip_prefix(DEFAULT_MARKER) {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let mut fields = rest.split_whitespace();
    let name = fields.next()?;
    let state = fields.next()?;
    let version = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(DistroState {
        name: name.to_string(),
        state: state.to_string(),
        version,
        is_default,
    })
}

/// Parses the `NAME STATE VERSION` table. The header is the first non-blank
/// line; rows that do not fit the three-column shape are skipped.
pub fn parse_distro_list(text: &str) -> Vec<DistroState> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .skip(1)
        .filter_map(|line| {
            let parsed = parse_line(line);
            if parsed.is_none() {
                log::debug!("Skipping distro line {line:?}");
            }
            parsed
        })
        .collect()
}

pub async fn list_distros(timeout: Duration) -> Result<Vec<DistroState>, CollectorError> {
    let output = require_success(WSL, run_query(WSL, &["-l", "-v"], timeout).await?)?;
    Ok(parse_distro_list(&decode_output(&output.stdout)))
}
