/// 32-bit fingerprint stored alongside device paths and file paths.
///
/// The input is folded in 8-byte windows while more than 8 bytes remain; a
/// trailing run of 8 bytes or fewer is folded byte-wise. All arithmetic
/// wraps. Hashes are computed over path bytes without the UTF-16 NUL
/// terminator and compared against the `name_hash` field of file records.
pub fn path_hash(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x0004_CB2F;
    let mut offset = 0;

    while offset + 8 < data.len() {
        let window = &data[offset..offset + 8];
        let mut value = u32::from(window[1]);
        value = value.wrapping_mul(0x25).wrapping_add(u32::from(window[2]));
        value = value.wrapping_mul(0x25).wrapping_add(u32::from(window[3]));
        value = value.wrapping_mul(0x25).wrapping_add(u32::from(window[4]));
        value = value.wrapping_mul(0x25).wrapping_add(u32::from(window[5]));
        value = value.wrapping_mul(0x25).wrapping_add(u32::from(window[6]));
        value = value.wrapping_mul(0x25);
        value = value.wrapping_add(0x1A61_7D0D_u32.wrapping_mul(u32::from(window[0])));

        hash = value
            .wrapping_sub(0x2FE8_ED1F_u32.wrapping_mul(hash))
            .wrapping_add(u32::from(window[7]));
        offset += 8;
    }
    for &byte in &data[offset..] {
        hash = hash.wrapping_mul(0x25).wrapping_add(u32::from(byte));
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le_bytes(text: &str) -> Vec<u8> {
        text.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn empty_input_yields_the_seed() {
        assert_eq!(path_hash(&[]), 0x0004_CB2F);
    }

    #[test]
    fn known_values() {
        assert_eq!(path_hash(&utf16le_bytes("C:\\")), 0x4D29_8F04);
        assert_eq!(
            path_hash(&utf16le_bytes("\\DEVICE\\HARDDISKVOLUME2")),
            0xBC1D_173B
        );
    }

    #[test]
    fn trailing_run_of_exactly_eight_bytes_folds_byte_wise() {
        // 8 bytes take the byte-wise path; 9 bytes fold one window first.
        let bytes: Vec<u8> = (0..9).collect();
        assert_eq!(path_hash(&bytes[..8]), 0x6D43_F6AB);
        assert_eq!(path_hash(&bytes), 0xCAD2_A6BF);
    }

    #[test]
    fn pure_function_of_the_input() {
        let bytes = utf16le_bytes("\\WINDOWS\\SYSTEM32\\NOTEPAD.EXE");
        assert_eq!(path_hash(&bytes), path_hash(&bytes.clone()));
    }
}
