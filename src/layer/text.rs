use std::borrow::Cow;

use encoding_rs::EUC_KR;

/// Repair Korean labels that were decoded as Latin-1 instead of CP949.
///
/// Each char of a mis-decoded string is one original byte, so the repair
/// maps chars back to bytes and decodes them as EUC-KR (encoding_rs treats
/// EUC-KR as the CP949 superset). Text that is plain ASCII, holds any char
/// above U+00FF, or does not decode cleanly is returned unchanged, which
/// makes the repair idempotent on correct text.
pub fn repair_korean_text(text: &str) -> Cow<'_, str> {
    if text.is_ascii() { return Cow::Borrowed(text) }

    let Some(bytes) = text.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect::<Option<Vec<u8>>>()
    else {
        return Cow::Borrowed(text);
    };

    let (decoded, had_errors) = EUC_KR.decode_without_bom_handling(&bytes);
    if had_errors { return Cow::Borrowed(text) }

    Cow::Owned(decoded.into_owned())
}
