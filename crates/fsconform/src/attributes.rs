//! `FILE_ATTRIBUTE_*` bits.

pub const READONLY: u32 = 0x0000_0001;
pub const HIDDEN: u32 = 0x0000_0002;
pub const SYSTEM: u32 = 0x0000_0004;
pub const DIRECTORY: u32 = 0x0000_0010;
pub const ARCHIVE: u32 = 0x0000_0020;
pub const NORMAL: u32 = 0x0000_0080;
pub const TEMPORARY: u32 = 0x0000_0100;
pub const SPARSE_FILE: u32 = 0x0000_0200;
pub const REPARSE_POINT: u32 = 0x0000_0400;
pub const COMPRESSED: u32 = 0x0000_0800;
pub const NOT_CONTENT_INDEXED: u32 = 0x0000_2000;

/// Renders the set bits as `ARCHIVE|READONLY`, falling back to hex for
/// unknown bits.
pub fn describe(attrs: u32) -> String {
    const NAMES: [(u32, &str); 11] = [
        (READONLY, "READONLY"),
        (HIDDEN, "HIDDEN"),
        (SYSTEM, "SYSTEM"),
        (DIRECTORY, "DIRECTORY"),
        (ARCHIVE, "ARCHIVE"),
        (NORMAL, "NORMAL"),
        (TEMPORARY, "TEMPORARY"),
        (SPARSE_FILE, "SPARSE_FILE"),
        (REPARSE_POINT, "REPARSE_POINT"),
        (COMPRESSED, "COMPRESSED"),
        (NOT_CONTENT_INDEXED, "NOT_CONTENT_INDEXED"),
    ];

    let mut parts: Vec<String> = Vec::new();
    let mut rest = attrs;
    for (bit, name) in NAMES {
        if attrs & bit != 0 {
            parts.push(name.to_string());
            rest &= !bit;
        }
    }
    if rest != 0 {
        parts.push(format!("{:#x}", rest));
    }
    if parts.is_empty() {
        return "0".to_string();
    }
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(describe(0), "0");
        assert_eq!(describe(ARCHIVE), "ARCHIVE");
        assert_eq!(describe(DIRECTORY | READONLY), "READONLY|DIRECTORY");
        assert_eq!(describe(ARCHIVE | 0x0100_0000), "ARCHIVE|0x1000000");
    }
}
