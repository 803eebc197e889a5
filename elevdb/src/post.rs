//! Post decoding and bilinear interpolation.
//!
//! A *post* is one 16-bit elevation sample in a cell's grid. DTED stores posts
//! as big-endian **signed-magnitude** integers, SRTM as big-endian two's
//! complement. Both reserve one value as a NULL marker.

/// NULL post marker for DTED cells.
pub const DTED_NULL: i16 = -32767;

/// NULL post marker (void) for SRTM cells.
pub const SRTM_NULL: i16 = -32768;

/// Byte order of posts in a cell file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

impl ByteOrder {
    /// Byte order of the host.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    /// Assemble a raw 16-bit word from file bytes.
    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
        }
    }
}

/// Integer representation of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostEncoding {
    /// Bit 15 is the sign, bits 0..15 the magnitude.
    SignedMagnitude,
    /// Ordinary two's complement.
    TwosComplement,
}

/// Decode a signed-magnitude word: `0x0005 → 5`, `0x8005 → -5`.
pub fn decode_signed_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a value as a signed-magnitude word.
///
/// `i16::MIN` has no signed-magnitude form and saturates to `-32767`.
pub fn encode_signed_magnitude(value: i16) -> u16 {
    let magnitude = value.unsigned_abs().min(0x7FFF);
    if value < 0 {
        0x8000 | magnitude
    } else {
        magnitude
    }
}

/// How to turn two file bytes into an optional height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostCodec {
    pub encoding: PostEncoding,
    pub byte_order: ByteOrder,
    pub null: i16,
}

impl PostCodec {
    /// DTED: big-endian signed-magnitude, NULL = -32767.
    pub const DTED: PostCodec = PostCodec {
        encoding: PostEncoding::SignedMagnitude,
        byte_order: ByteOrder::BigEndian,
        null: DTED_NULL,
    };

    /// SRTM: big-endian two's complement, NULL = -32768.
    pub const SRTM: PostCodec = PostCodec {
        encoding: PostEncoding::TwosComplement,
        byte_order: ByteOrder::BigEndian,
        null: SRTM_NULL,
    };

    /// Decode a post, returning `None` for the NULL marker.
    pub fn decode(&self, bytes: [u8; 2]) -> Option<i16> {
        let raw = self.byte_order.read_u16(bytes);
        let value = match self.encoding {
            PostEncoding::SignedMagnitude => decode_signed_magnitude(raw),
            PostEncoding::TwosComplement => raw as i16,
        };
        (value != self.null).then_some(value)
    }
}

/// Where a query point falls within a post grid.
///
/// `row0`/`col0` index the upper-left post of the enclosing 2×2 block;
/// `frac_row`/`frac_col` are the offsets toward `row0 + 1` / `col0 + 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPosition {
    pub row0: usize,
    pub col0: usize,
    pub frac_row: f64,
    pub frac_col: f64,
}

/// Fractional positions closer than this to a post index snap onto it.
const SNAP_EPSILON: f64 = 1e-9;

impl GridPosition {
    /// Locate fractional grid coordinates in a `rows × cols` grid.
    ///
    /// Returns `None` if the position is outside the grid or the grid has
    /// fewer than two posts along either axis.
    pub fn locate(row: f64, col: f64, rows: usize, cols: usize) -> Option<Self> {
        if rows < 2 || cols < 2 || !row.is_finite() || !col.is_finite() {
            return None;
        }

        let row = snap(row);
        let col = snap(col);
        let max_row = (rows - 1) as f64;
        let max_col = (cols - 1) as f64;
        if row < 0.0 || col < 0.0 || row > max_row || col > max_col {
            return None;
        }

        // On the last row/column the block starts one post earlier with a
        // full weight on the far side.
        let row0 = (row.floor() as usize).min(rows - 2);
        let col0 = (col.floor() as usize).min(cols - 2);

        Some(Self {
            row0,
            col0,
            frac_row: row - row0 as f64,
            frac_col: col - col0 as f64,
        })
    }

    /// The four surrounding posts with their bilinear weights.
    pub fn corners(&self) -> [(usize, usize, f64); 4] {
        let (fr, fc) = (self.frac_row, self.frac_col);
        [
            (self.row0, self.col0, (1.0 - fr) * (1.0 - fc)),
            (self.row0, self.col0 + 1, (1.0 - fr) * fc),
            (self.row0 + 1, self.col0, fr * (1.0 - fc)),
            (self.row0 + 1, self.col0 + 1, fr * fc),
        ]
    }
}

fn snap(value: f64) -> f64 {
    let nearest = value.round();
    if (value - nearest).abs() < SNAP_EPSILON {
        nearest
    } else {
        value
    }
}

/// Bilinear interpolation that skips NULL posts.
///
/// `fetch(row, col)` returns `Ok(None)` for a NULL post. Posts with zero
/// weight are never fetched. Weights of the valid posts are renormalized to
/// sum to one; if no post contributes the result is `NaN`.
pub fn interpolate<E, F>(position: &GridPosition, mut fetch: F) -> Result<f64, E>
where
    F: FnMut(usize, usize) -> Result<Option<f64>, E>,
{
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for (row, col, weight) in position.corners() {
        if weight <= 0.0 {
            continue;
        }
        if let Some(value) = fetch(row, col)? {
            weighted_sum += weight * value;
            weight_total += weight;
        }
    }

    if weight_total > 0.0 {
        Ok(weighted_sum / weight_total)
    } else {
        Ok(f64::NAN)
    }
}
