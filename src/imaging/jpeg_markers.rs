//! Minimal JPEG marker-segment walker.
//!
//! Two pieces of source metadata matter to the engine and neither is exposed
//! by the decoder:
//! - the luminance quantization table (DQT, `0xFFDB`), from which the
//!   encoder quality of the source is estimated;
//! - the EXIF block (APP1, `0xFFE1`, `"Exif\0\0"` header), which is carried
//!   over to re-encoded JPEGs so orientation and camera tags survive.
//!
//! Only the header is walked; scanning stops at SOS (`0xFFDA`) where the
//! entropy-coded data begins.

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;

const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Largest payload a marker segment can carry (length field minus itself).
const MAX_SEGMENT_PAYLOAD: usize = u16::MAX as usize - 2;

/// IJG / Annex K luminance quantization table (order does not matter here,
/// only the sum is compared).
const STD_LUMA_QTABLE: [u16; 64] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99,
];

/// One marker segment in the JPEG header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub marker: u8,
    /// Offset of the segment's `0xFF` byte.
    pub offset: usize,
    /// Bytes after the 2-byte length field.
    pub payload: &'a [u8],
}

impl Segment<'_> {
    /// Offset just past the end of this segment.
    pub fn end(&self) -> usize {
        self.offset + 4 + self.payload.len()
    }
}

/// Iterator over the header segments of a JPEG, stopping at SOS.
pub struct Segments<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Walk the header segments of `data`. Yields nothing if `data` is not a JPEG.
pub fn segments(data: &[u8]) -> Segments<'_> {
    let pos = if data.starts_with(&[0xFF, SOI]) {
        2
    } else {
        data.len()
    };
    Segments { data, pos }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        let data = self.data;
        loop {
            if self.pos + 4 > data.len() || data[self.pos] != 0xFF {
                self.pos = data.len();
                return None;
            }
            let marker = data[self.pos + 1];
            match marker {
                // Fill bytes before a marker
                0xFF => {
                    self.pos += 1;
                    continue;
                }
                SOS | EOI => {
                    self.pos = data.len();
                    return None;
                }
                // Markers without a length field
                0x01 | 0xD0..=0xD7 => {
                    self.pos += 2;
                    continue;
                }
                _ => {}
            }

            let len = usize::from(u16::from_be_bytes([data[self.pos + 2], data[self.pos + 3]]));
            if len < 2 || self.pos + 2 + len > data.len() {
                self.pos = data.len();
                return None;
            }

            let segment = Segment {
                marker,
                offset: self.pos,
                payload: &data[self.pos + 4..self.pos + 2 + len],
            };
            self.pos = segment.end();
            return Some(segment);
        }
    }
}

/// Payload of the EXIF APP1 segment, including its `"Exif\0\0"` header.
pub fn find_exif_segment(data: &[u8]) -> Option<&[u8]> {
    segments(data)
        .find(|s| s.marker == APP1 && s.payload.starts_with(EXIF_HEADER))
        .map(|s| s.payload)
}

/// The 64 entries of quantization table 0 (luminance), if present.
fn luma_qtable(data: &[u8]) -> Option<[u16; 64]> {
    for segment in segments(data).filter(|s| s.marker == DQT) {
        let payload = segment.payload;
        let mut pos = 0;
        // A DQT segment may hold several tables back to back
        while pos < payload.len() {
            let precision = payload[pos] >> 4;
            let id = payload[pos] & 0x0F;
            let entry_size = if precision == 0 { 1 } else { 2 };
            let table_end = pos + 1 + 64 * entry_size;
            if table_end > payload.len() {
                break;
            }

            if id == 0 {
                let mut table = [0u16; 64];
                for (i, entry) in table.iter_mut().enumerate() {
                    let at = pos + 1 + i * entry_size;
                    *entry = if entry_size == 1 {
                        u16::from(payload[at])
                    } else {
                        u16::from_be_bytes([payload[at], payload[at + 1]])
                    };
                }
                return Some(table);
            }
            pos = table_end;
        }
    }
    None
}

/// Estimate the IJG quality (1–100) the source JPEG was encoded with.
///
/// Inverts the IJG scaling `q_i = (std_i × scale + 50) / 100` on the sum of
/// the luminance table, then `scale → quality` (`scale = 5000 / Q` below 50,
/// `200 − 2Q` above). Returns `None` when the file has no luminance table.
pub fn estimate_quality(data: &[u8]) -> Option<u8> {
    let table = luma_qtable(data)?;
    if table.iter().all(|&q| q <= 1) {
        return Some(100);
    }

    let sum: f64 = table.iter().map(|&q| f64::from(q)).sum();
    let std_sum: f64 = STD_LUMA_QTABLE.iter().map(|&q| f64::from(q)).sum();
    let scale = sum * 100.0 / std_sum;

    let quality = if scale <= 100.0 {
        (200.0 - scale) / 2.0
    } else {
        5000.0 / scale
    };
    Some(quality.round().clamp(1.0, 100.0) as u8)
}

/// Insert an APP1 segment carrying `payload` into an encoded JPEG.
///
/// The segment is placed right after SOI, or after the JFIF APP0 segment when
/// one leads the file. Returns the input unchanged if it is not a JPEG or the
/// payload does not fit in a single segment.
pub fn insert_app1(jpeg: &[u8], payload: &[u8]) -> Vec<u8> {
    if !jpeg.starts_with(&[0xFF, SOI]) || payload.len() > MAX_SEGMENT_PAYLOAD {
        return jpeg.to_vec();
    }

    let at = segments(jpeg)
        .next()
        .filter(|s| s.marker == APP0)
        .map(|s| s.end())
        .unwrap_or(2);

    let len = (payload.len() + 2) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..at]);
    out.extend_from_slice(&[0xFF, APP1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&jpeg[at..]);
    out
}
