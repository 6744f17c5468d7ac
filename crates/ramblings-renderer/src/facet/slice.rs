/// Slice `text` by a UTF-8 byte range without ever panicking.
///
/// The start snaps to the beginning of the scalar containing `byte_start`;
/// the end snaps to the end of the scalar containing the last byte before
/// `byte_end`. Offsets that never land on a scalar make the slice run to the
/// end of the string, so malformed ranges over-include rather than fail.
pub fn byte_slice(text: &str, byte_start: i64, byte_end: i64) -> &str {
    let total = text.len() as i64;
    let mut start = 0;
    let mut end = text.len();
    let mut end_found = false;

    for (offset, ch) in text.char_indices() {
        let current = offset as i64;
        let next = current + ch.len_utf8() as i64;

        if current <= byte_start && byte_start < next {
            start = offset;
        }
        if current < byte_end && byte_end <= next {
            end = offset + ch.len_utf8();
            end_found = true;
            break;
        }
    }

    if byte_start <= 0 {
        start = 0;
    }
    if !end_found && byte_end >= total {
        end = text.len();
    }

    text.get(start..end).unwrap_or("")
}
