//! Shared HDLC-style byte-stuffing framing. Concrete serial/KISS-style
//! interfaces build their own framing on top of this, per the `Interface`
//! contract's "apply framing where needed" clause.

const FRAME_FLAG: u8 = 0x7e;
const ESCAPE_BYTE: u8 = 0x7d;
const ESCAPE_MASK: u8 = 0b0010_0000;

/// Frame `data` between two `FRAME_FLAG` bytes, escaping any occurrence of
/// the flag or escape byte inside the payload.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 2);
    out.push(FRAME_FLAG);
    for &byte in data {
        match byte {
            FRAME_FLAG | ESCAPE_BYTE => out.extend_from_slice(&[ESCAPE_BYTE, byte ^ ESCAPE_MASK]),
            _ => out.push(byte),
        }
    }
    out.push(FRAME_FLAG);
    out
}

/// Locate the first complete `(start, end)` pair of frame-flag indices in
/// `data`, if any.
pub fn find(data: &[u8]) -> Option<(usize, usize)> {
    let mut start = None;
    for (i, &byte) in data.iter().enumerate() {
        if byte != FRAME_FLAG {
            continue;
        }
        match start {
            None => start = Some(i),
            Some(start_index) => return Some((start_index, i)),
        }
    }
    None
}

/// Decode a single HDLC frame out of `data`. Returns `None` if the stream
/// never reaches a closing flag.
pub fn decode(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut started = false;
    let mut escape = false;

    for &byte in data {
        if escape {
            escape = false;
            out.push(byte ^ ESCAPE_MASK);
            continue;
        }
        match byte {
            FRAME_FLAG => {
                if started {
                    return Some(out);
                }
                started = true;
            }
            ESCAPE_BYTE => escape = true,
            _ => out.push(byte),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_roundtrips() {
        let data = vec![0x7e, 0x7d, 1, 2, 3];
        let framed = encode(&data);
        assert_eq!(decode(&framed), Some(data));
    }

    #[test]
    fn find_locates_frame_boundaries() {
        let framed = encode(b"hello");
        let (start, end) = find(&framed).expect("frame");
        assert_eq!(start, 0);
        assert_eq!(end, framed.len() - 1);
    }

    #[test]
    fn decode_returns_none_without_closing_flag() {
        assert_eq!(decode(&[FRAME_FLAG, 1, 2, 3]), None);
    }
}
