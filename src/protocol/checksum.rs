//! Header checksum
//!
//! Dihitung atas bytes header setelah magic + checksum slot
//! (`bytes[8..header_len]`). Sama untuk native dan R5.

/// Wrapping sum atas word big-endian 32-bit; sisa 1-3 byte di-fold
/// big-endian lalu ditambahkan.
#[inline(always)]
pub fn header_checksum(data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(4);
    let mut sum: u32 = 0;

    for word in &mut chunks {
        sum = sum.wrapping_add(u32::from_be_bytes([word[0], word[1], word[2], word[3]]));
    }

    let tail = chunks
        .remainder()
        .iter()
        .fold(0u32, |acc, &byte| (acc << 8) | byte as u32);

    sum.wrapping_add(tail)
}
