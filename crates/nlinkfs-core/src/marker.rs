//! On-disk marker file format for emulated symlinks
//!
//! A marker is an ordinary regular file on the backing store: the ASCII
//! signature `NLINKFS`, one newline, then the link target. Only the first
//! line after the signature belongs to the target; content past a further
//! newline is ignored.

/// Signature bytes every marker file starts with.
pub const SIGNATURE: &[u8] = b"NLINKFS";

/// Suffix that turns a virtual name into its marker file name.
pub const MARKER_SUFFIX: &str = ".LNK";

/// Encode a link target into marker file bytes.
pub fn encode(target: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SIGNATURE.len() + 1 + target.len());
    buf.extend_from_slice(SIGNATURE);
    buf.push(b'\n');
    buf.extend_from_slice(target);
    buf
}

/// Decode marker file bytes into the link target.
///
/// Returns `None` when the content is not a valid marker: shorter than the
/// signature, signature mismatch, or no newline after the signature (a
/// crash during creation can leave such a file behind). The target runs
/// until end of content or the next newline, whichever comes first.
pub fn decode(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() < SIGNATURE.len() || &bytes[..SIGNATURE.len()] != SIGNATURE {
        return None;
    }
    let rest = &bytes[SIGNATURE.len()..];
    let start = rest.iter().position(|&b| b == b'\n')? + 1;
    let target = &rest[start..];
    match target.iter().position(|&b| b == b'\n') {
        Some(end) => Some(&target[..end]),
        None => Some(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for target in [
            &b""[..],
            b"hello.txt",
            b"/a/b/c",
            b"../relative/path",
            b"name with spaces",
        ] {
            assert_eq!(decode(&encode(target)), Some(target));
        }
    }

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode(b"hello.txt"), b"NLINKFS\nhello.txt");
        assert_eq!(encode(b""), b"NLINKFS\n");
    }

    #[test]
    fn test_rejects_short_content() {
        assert_eq!(decode(b""), None);
        assert_eq!(decode(b"NLINK"), None);
    }

    #[test]
    fn test_rejects_wrong_signature() {
        assert_eq!(decode(b"XLINKFS\nfoo"), None);
        assert_eq!(decode(b"nlinkfs\nfoo"), None);
        assert_eq!(decode(b"LNKFILE\nfoo"), None);
    }

    #[test]
    fn test_rejects_missing_newline() {
        assert_eq!(decode(b"NLINKFS"), None);
        assert_eq!(decode(b"NLINKFStarget"), None);
    }

    #[test]
    fn test_truncates_at_second_newline() {
        assert_eq!(decode(b"NLINKFS\nfoo\ngarbage"), Some(&b"foo"[..]));
        assert_eq!(decode(b"NLINKFS\n\ntrailing"), Some(&b""[..]));
    }

    #[test]
    fn test_empty_target() {
        assert_eq!(decode(b"NLINKFS\n"), Some(&b""[..]));
    }
}
