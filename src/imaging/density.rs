//! Print-density metadata, written without touching pixel data.
//!
//! | Container | Field | Unit stored |
//! |---|---|---|
//! | PNG | `pHYs` chunk | pixels per metre |
//! | JPEG | JFIF APP0 `Xdensity`/`Ydensity` | dots per inch |
//!
//! PNG: any existing `pHYs` chunk is dropped and a fresh one is inserted
//! right after `IHDR`. All other chunks, including every `IDAT`, are copied
//! byte for byte. JPEG: the JFIF header is patched in place, or a minimal one
//! is inserted after SOI when the file has none.
//!
//! Anything else (WebP, truncated or malformed containers) comes back
//! untouched as [`DensityOutcome::Unsupported`].

use crate::settings::Density;

const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
const METRES_PER_INCH: f64 = 0.0254;

/// Result of a density write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DensityOutcome {
    Written(Vec<u8>),
    /// The container has no density field we can set. Bytes are unchanged.
    Unsupported(Vec<u8>),
}

impl DensityOutcome {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Written(bytes) | Self::Unsupported(bytes) => bytes,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Set the density field of an encoded image.
pub fn write_density(bytes: Vec<u8>, density: Density) -> DensityOutcome {
    let rewritten = if bytes.starts_with(PNG_SIGNATURE) {
        write_png(&bytes, density)
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        write_jpeg(&bytes, density)
    } else {
        None
    };
    match rewritten {
        Some(out) => DensityOutcome::Written(out),
        None => DensityOutcome::Unsupported(bytes),
    }
}

/// Read the density back, if the container records one in absolute units.
pub fn read_density(bytes: &[u8]) -> Option<Density> {
    if bytes.starts_with(PNG_SIGNATURE) {
        let chunk = png_chunks(bytes)?.find(|c| &c.kind == b"pHYs")?;
        let data = chunk.data;
        if data.len() != 9 || data[8] != 1 {
            return None;
        }
        let ppm = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        Density::new((ppm as f64 * METRES_PER_INCH).round() as u32).ok()
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        let pos = find_jfif(bytes)?;
        let units = bytes[pos + 11];
        let x = u16::from_be_bytes([bytes[pos + 12], bytes[pos + 13]]) as f64;
        let dpi = match units {
            1 => x,
            2 => x * 2.54,
            _ => return None,
        };
        Density::new(dpi.round() as u32).ok()
    } else {
        None
    }
}

// =============================================================================
// PNG
// =============================================================================

struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
    /// Full chunk bytes: length, type, data and CRC.
    raw: &'a [u8],
}

/// Iterate over chunks, or `None` if the chunk layout is malformed.
fn png_chunks(bytes: &[u8]) -> Option<impl Iterator<Item = Chunk<'_>>> {
    let mut chunks = Vec::new();
    let mut pos = PNG_SIGNATURE.len();
    while pos < bytes.len() {
        let header = bytes.get(pos..pos + 8)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let end = pos.checked_add(12)?.checked_add(len)?;
        let raw = bytes.get(pos..end)?;
        chunks.push(Chunk {
            kind: [header[4], header[5], header[6], header[7]],
            data: &raw[8..8 + len],
            raw,
        });
        pos = end;
    }
    Some(chunks.into_iter())
}

fn phys_chunk(density: Density) -> Vec<u8> {
    let ppm = (density.dpi() as f64 / METRES_PER_INCH).round() as u32;
    let mut body = Vec::with_capacity(13);
    body.extend_from_slice(b"pHYs");
    body.extend_from_slice(&ppm.to_be_bytes());
    body.extend_from_slice(&ppm.to_be_bytes());
    body.push(1);

    let mut chunk = Vec::with_capacity(21);
    chunk.extend_from_slice(&9u32.to_be_bytes());
    chunk.extend_from_slice(&body);
    chunk.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
    chunk
}

fn write_png(bytes: &[u8], density: Density) -> Option<Vec<u8>> {
    let mut chunks = png_chunks(bytes)?.peekable();
    if chunks.peek().map(|c| &c.kind) != Some(b"IHDR") {
        return None;
    }
    let mut out = Vec::with_capacity(bytes.len() + 21);
    out.extend_from_slice(PNG_SIGNATURE);
    for chunk in chunks {
        if &chunk.kind == b"pHYs" {
            continue;
        }
        out.extend_from_slice(chunk.raw);
        if &chunk.kind == b"IHDR" {
            out.extend_from_slice(&phys_chunk(density));
        }
    }
    Some(out)
}

// =============================================================================
// JPEG
// =============================================================================

/// Offset of the JFIF APP0 marker among the leading APPn/COM segments.
fn find_jfif(bytes: &[u8]) -> Option<usize> {
    let mut pos = 2;
    loop {
        let marker = bytes.get(pos..pos + 4)?;
        if marker[0] != 0xFF || !(matches!(marker[1], 0xE0..=0xEF) || marker[1] == 0xFE) {
            return None;
        }
        let len = u16::from_be_bytes([marker[2], marker[3]]) as usize;
        if marker[1] == 0xE0
            && len >= 16
            && bytes.get(pos + 4..pos + 9) == Some(b"JFIF\0".as_slice())
            && bytes.len() >= pos + 18
        {
            return Some(pos);
        }
        pos += 2 + len;
    }
}

fn write_jpeg(bytes: &[u8], density: Density) -> Option<Vec<u8>> {
    let dpi = u16::try_from(density.dpi()).ok()?;
    let mut out = bytes.to_vec();
    match find_jfif(bytes) {
        Some(pos) => {
            out[pos + 11] = 1;
            out[pos + 12..pos + 14].copy_from_slice(&dpi.to_be_bytes());
            out[pos + 14..pos + 16].copy_from_slice(&dpi.to_be_bytes());
        }
        None => {
            let mut app0 = vec![0xFF, 0xE0, 0x00, 0x10];
            app0.extend_from_slice(b"JFIF\0");
            app0.extend_from_slice(&[1, 1, 1]);
            app0.extend_from_slice(&dpi.to_be_bytes());
            app0.extend_from_slice(&dpi.to_be_bytes());
            app0.extend_from_slice(&[0, 0]);
            out.splice(2..2, app0);
        }
    }
    Some(out)
}
