// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt::Write;

/// Number of hex characters in an unhyphenated GUID.
pub const GUID_HEX_LEN: usize = 32;

/// Format 32 raw hex characters as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.
///
/// Returns `None` unless the input is exactly 32 ASCII hex digits. Output is
/// always uppercase.
pub fn format_guid(hex: &str) -> Option<String> {
    if hex.len() != GUID_HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let hex = hex.to_ascii_uppercase();
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

/// Convert a GUID as stored on disk into its 32-char hex form.
///
/// Windows GUID layout:
///   - Data1: 4 bytes, little-endian
///   - Data2: 2 bytes, little-endian
///   - Data3: 2 bytes, little-endian
///   - Data4: 8 bytes, unchanged
pub fn guid_bytes_to_hex(bytes: &[u8; 16]) -> String {
    let mut hex = String::with_capacity(GUID_HEX_LEN);
    let swapped = bytes[0..4]
        .iter()
        .rev()
        .chain(bytes[4..6].iter().rev())
        .chain(bytes[6..8].iter().rev())
        .chain(bytes[8..16].iter());
    for b in swapped {
        write!(hex, "{b:02X}").unwrap();
    }
    hex
}

/// Format an on-disk GUID in the hyphenated form.
pub fn format_guid_bytes(bytes: &[u8; 16]) -> String {
    let hex = guid_bytes_to_hex(bytes);
    // guid_bytes_to_hex always yields 32 hex digits
    format_guid(&hex).unwrap_or(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_guid_shaped(s: &str) -> bool {
        let groups: Vec<&str> = s.split('-').collect();
        groups.len() == 5
            && groups.iter().map(|g| g.len()).eq([8, 4, 4, 4, 12])
            && groups
                .iter()
                .all(|g| g.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b)))
    }

    #[test]
    fn test_format_guid() {
        assert_eq!(
            format_guid("00112233445566778899AABBCCDDEEFF").as_deref(),
            Some("00112233-4455-6677-8899-AABBCCDDEEFF")
        );
        assert_eq!(
            format_guid("deadbeefdeadbeefdeadbeefdeadbeef").as_deref(),
            Some("DEADBEEF-DEAD-BEEF-DEAD-BEEFDEADBEEF")
        );
    }

    #[test]
    fn test_format_guid_rejects_bad_input() {
        assert!(format_guid("").is_none());
        assert!(format_guid("00112233445566778899AABBCCDDEEF").is_none());
        assert!(format_guid("00112233445566778899AABBCCDDEEFF0").is_none());
        assert!(format_guid("00112233445566778899AABBCCDDEEFG").is_none());
    }

    #[test]
    fn test_guid_bytes_byte_order() {
        // E37085B2-4E2C-4BF4-B83F-84F16BC71B74 as stored in an RSDS record
        let bytes = [
            0xb2, 0x85, 0x70, 0xe3, 0x2c, 0x4e, 0xf4, 0x4b, 0xb8, 0x3f, 0x84, 0xf1, 0x6b, 0xc7,
            0x1b, 0x74,
        ];
        assert_eq!(guid_bytes_to_hex(&bytes), "E37085B24E2C4BF4B83F84F16BC71B74");
        assert_eq!(format_guid_bytes(&bytes), "E37085B2-4E2C-4BF4-B83F-84F16BC71B74");
    }

    #[test]
    fn test_output_shape() {
        let samples: [[u8; 16]; 3] = [[0; 16], [0xff; 16], *b"0123456789abcdef"];
        for bytes in &samples {
            assert!(is_guid_shaped(&format_guid_bytes(bytes)));
        }
        assert!(is_guid_shaped(
            &format_guid("3e3a3e3a1c054e67b9b799d781e5fb5c").unwrap()
        ));
    }
}
