//! Byte-exact access to dBase character fields.
//!
//! `dbase` 0.5 decodes text through lossy UTF-8 and its encoding trait cannot
//! be implemented outside the crate, so legacy CP949 labels come back as
//! U+FFFD. This pass re-reads the table layout and keeps the original bytes.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const DESCRIPTOR_END: u8 = 0x0D;
const DELETED: u8 = b'*';

/// Location of one character field inside a record.
#[derive(Clone, Debug, PartialEq, Eq)]
struct CharField {
    name: String,
    /// Offset from the start of the record, past the deletion flag.
    offset: usize,
    len: usize,
}

/// Raw, space-trimmed bytes of every character field, one entry per live record.
///
/// Deleted records are skipped, matching the order `dbase` yields records in.
pub(crate) fn read_character_fields(path: &Path) -> Result<Vec<Vec<(String, Vec<u8>)>>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_character_fields(&bytes).with_context(|| format!("Malformed dBase table {}", path.display()))
}

fn parse_character_fields(bytes: &[u8]) -> Result<Vec<Vec<(String, Vec<u8>)>>> {
    if bytes.len() < HEADER_LEN { bail!("header truncated ({} bytes)", bytes.len()) }
    let num_records = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let header_len = usize::from(u16::from_le_bytes([bytes[8], bytes[9]]));
    let record_len = usize::from(u16::from_le_bytes([bytes[10], bytes[11]]));

    if record_len == 0 && num_records > 0 { bail!("zero-length records") }

    let fields = parse_descriptors(bytes, header_len);
    if let Some(field) = fields.iter().find(|field| 1 + field.offset + field.len > record_len) {
        bail!("field {} overruns the {record_len}-byte record", field.name);
    }

    let mut records = Vec::with_capacity(num_records);
    for i in 0..num_records {
        let start = header_len + i * record_len;
        let Some(record) = bytes.get(start..start + record_len) else {
            bail!("record {i} truncated");
        };
        if record[0] == DELETED { continue }

        records.push(fields.iter()
            .map(|field| {
                let value = &record[1 + field.offset..1 + field.offset + field.len];
                (field.name.clone(), trim(value).to_vec())
            })
            .collect());
    }
    Ok(records)
}

fn parse_descriptors(bytes: &[u8], header_len: usize) -> Vec<CharField> {
    let mut fields = Vec::new();
    let mut offset = 0;
    let mut pos = HEADER_LEN;
    while pos + DESCRIPTOR_LEN <= header_len.min(bytes.len()) && bytes[pos] != DESCRIPTOR_END {
        let descriptor = &bytes[pos..pos + DESCRIPTOR_LEN];
        let len = usize::from(descriptor[16]);
        if descriptor[11] == b'C' {
            let name = String::from_utf8_lossy(&descriptor[..11]).trim_matches('\0').to_string();
            fields.push(CharField { name, offset, len });
        }
        offset += len;
        pos += DESCRIPTOR_LEN;
    }
    fields
}

fn trim(value: &[u8]) -> &[u8] {
    let blank = |b: &u8| *b == b' ' || *b == 0;
    let start = value.iter().position(|b| !blank(b)).unwrap_or(value.len());
    let end = value.iter().rposition(|b| !blank(b)).map_or(start, |i| i + 1);
    &value[start..end]
}

/// Decode field bytes as UTF-8 when valid, else map them 1:1 onto U+0000..=U+00FF.
///
/// The Latin-1 fallback is lossless, so `repair_korean_text` can recover
/// CP949 labels afterwards. Empty fields decode to `None`.
pub(crate) fn decode_text(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() { return None }
    Some(match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    })
}
