//! DTED (Digital Terrain Elevation Data) cells.
//!
//! # File layout
//!
//! | Record | Length | Notes |
//! |--------|--------|-------|
//! | `VOL`, `HDR` | 80 each | optional tape labels, skipped |
//! | `UHL` | 80 | origin, post spacing, grid size |
//! | `DSI` | 648 | product level (`DTED0`..`DTED2`) |
//! | `ACC` | 2700 | absolute CE90 / LE90 |
//! | data | `8 + lat_points * 2 + 4` each | one per longitude line, west to east |
//!
//! A data record is `0xAA`, a 3-byte block count, 2-byte longitude and
//! latitude counts, the posts south to north, then a big-endian `u32`
//! checksum: the byte sum of everything before it.

use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::source::{PostSource, SourceSlot};
use super::{
    open_source, AccuracyInfo, CellFormat, CellHandler, CellOptions, CellStatus, GridGeometry,
};
use crate::error::{ElevationError, Result};
use crate::filename::dted_extension_level;
use crate::geo::{CellBounds, GeoPoint};
use crate::post::{interpolate, PostCodec};

const LABEL_LEN: u64 = 80;
const UHL_LEN: u64 = 80;
const DSI_LEN: u64 = 648;
const ACC_LEN: u64 = 2700;

/// Upper bound on leading VOL/HDR labels.
const MAX_LABELS: usize = 4;

/// First byte of every data record.
pub const RECORD_SENTINEL: u8 = 0xAA;

/// Bytes before the first post of a data record.
pub const RECORD_HEADER_LEN: u64 = 8;

/// Bytes after the last post of a data record.
pub const RECORD_CHECKSUM_LEN: u64 = 4;

/// Parsed UHL, DSI and ACC records.
#[derive(Debug, Clone, PartialEq)]
pub struct DtedHeader {
    /// Longitude of the southwest post, degrees.
    pub lon_origin: f64,
    /// Latitude of the southwest post, degrees.
    pub lat_origin: f64,
    /// Longitude post spacing in tenths of arc-seconds.
    pub lon_interval: u32,
    /// Latitude post spacing in tenths of arc-seconds.
    pub lat_interval: u32,
    /// UHL absolute vertical accuracy, meters.
    pub uhl_vertical_accuracy: Option<u32>,
    pub security_code: String,
    /// Number of longitude lines (data records).
    pub lon_lines: usize,
    /// Number of latitude points per longitude line.
    pub lat_points: usize,
    /// DTED product level (0, 1 or 2).
    pub level: u8,
    /// ACC absolute horizontal accuracy (CE90), meters.
    pub absolute_horizontal: Option<u32>,
    /// ACC absolute vertical accuracy (LE90), meters.
    pub absolute_vertical: Option<u32>,
    /// File offset of the first data record.
    pub data_offset: u64,
}

impl DtedHeader {
    /// Parse and validate the header records of `source`.
    ///
    /// Fails on a sentinel mismatch, an unparseable field, a file shorter than
    /// the header implies, or (when `verify_checksums` is set) a bad record.
    pub fn parse(source: &PostSource, path: &Path, verify_checksums: bool) -> Result<Self> {
        let file_len = source.len()?;
        let mut offset = 0u64;

        for _ in 0..MAX_LABELS {
            let mut tag = [0u8; 3];
            if offset + LABEL_LEN > file_len {
                break;
            }
            source.read_at(offset, &mut tag)?;
            if &tag == b"VOL" || &tag == b"HDR" {
                offset += LABEL_LEN;
            } else {
                break;
            }
        }

        let data_offset = offset + UHL_LEN + DSI_LEN + ACC_LEN;
        if file_len < data_offset {
            return Err(ElevationError::Truncated {
                path: path.to_path_buf(),
                expected: data_offset,
                actual: file_len,
            });
        }

        let mut uhl = [0u8; UHL_LEN as usize];
        source.read_at(offset, &mut uhl)?;
        expect_sentinel(path, &uhl, "UHL")?;

        let mut dsi = vec![0u8; DSI_LEN as usize];
        source.read_at(offset + UHL_LEN, &mut dsi)?;
        expect_sentinel(path, &dsi, "DSI")?;

        let mut acc = vec![0u8; ACC_LEN as usize];
        source.read_at(offset + UHL_LEN + DSI_LEN, &mut acc)?;
        expect_sentinel(path, &acc, "ACC")?;

        let header = Self {
            lon_origin: parse_dms(path, "longitude origin", field(&uhl, 4..12))?,
            lat_origin: parse_dms(path, "latitude origin", field(&uhl, 12..20))?,
            lon_interval: parse_count(path, "longitude interval", field(&uhl, 20..24))?,
            lat_interval: parse_count(path, "latitude interval", field(&uhl, 24..28))?,
            uhl_vertical_accuracy: parse_optional(field(&uhl, 28..32)),
            security_code: field(&uhl, 32..35).trim().to_string(),
            lon_lines: parse_count(path, "longitude line count", field(&uhl, 47..51))? as usize,
            lat_points: parse_count(path, "latitude point count", field(&uhl, 51..55))? as usize,
            level: parse_level(path, field(&dsi, 59..64))?,
            absolute_horizontal: parse_optional(field(&acc, 3..7)),
            absolute_vertical: parse_optional(field(&acc, 7..11)),
            data_offset,
        };
        header.validate(path)?;

        let expected = header.expected_len();
        if file_len < expected {
            return Err(ElevationError::Truncated {
                path: path.to_path_buf(),
                expected,
                actual: file_len,
            });
        }

        if verify_checksums {
            header.verify_records(source, path)?;
        }

        Ok(header)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |field: &'static str, value: String| ElevationError::InvalidHeader {
            path: path.to_path_buf(),
            field,
            value,
        };
        if self.lon_interval == 0 {
            return Err(invalid("longitude interval", "0".into()));
        }
        if self.lat_interval == 0 {
            return Err(invalid("latitude interval", "0".into()));
        }
        if self.lon_lines < 2 {
            return Err(invalid("longitude line count", self.lon_lines.to_string()));
        }
        if self.lat_points < 2 {
            return Err(invalid("latitude point count", self.lat_points.to_string()));
        }
        Ok(())
    }

    /// Size of one data record in bytes.
    pub fn record_size(&self) -> u64 {
        RECORD_HEADER_LEN + self.lat_points as u64 * 2 + RECORD_CHECKSUM_LEN
    }

    /// Minimum file length implied by the header.
    pub fn expected_len(&self) -> u64 {
        self.data_offset + self.lon_lines as u64 * self.record_size()
    }

    /// Byte offset of the post `index` (counted from the south) on
    /// longitude line `record`.
    pub fn post_offset(&self, record: usize, index: usize) -> u64 {
        self.data_offset
            + record as u64 * self.record_size()
            + RECORD_HEADER_LEN
            + index as u64 * 2
    }

    pub fn lat_spacing_degrees(&self) -> f64 {
        self.lat_interval as f64 / 36_000.0
    }

    pub fn lon_spacing_degrees(&self) -> f64 {
        self.lon_interval as f64 / 36_000.0
    }

    /// Grid placement with row 0 on the north edge.
    pub fn geometry(&self) -> GridGeometry {
        let lat_spacing = self.lat_spacing_degrees();
        GridGeometry {
            north: self.lat_origin + (self.lat_points - 1) as f64 * lat_spacing,
            west: self.lon_origin,
            lat_spacing,
            lon_spacing: self.lon_spacing_degrees(),
            rows: self.lat_points,
            cols: self.lon_lines,
        }
    }

    /// Accuracy from the ACC record, falling back to the UHL and then to
    /// nominal values for the product level.
    pub fn accuracy(&self) -> AccuracyInfo {
        let (default_ce90, default_le90) = match self.level {
            2 => (23.0, 18.0),
            _ => (50.0, 30.0),
        };
        let ce90 = self.absolute_horizontal.map_or(default_ce90, f64::from);
        let le90 = self
            .absolute_vertical
            .or(self.uhl_vertical_accuracy)
            .map_or(default_le90, f64::from);
        AccuracyInfo::new(ce90, le90, format!("DTED{}", self.level))
    }

    fn verify_records(&self, source: &PostSource, path: &Path) -> Result<()> {
        let record_size = self.record_size() as usize;
        let mut record = vec![0u8; record_size];
        let body_len = record_size - RECORD_CHECKSUM_LEN as usize;

        for index in 0..self.lon_lines {
            source.read_at(self.post_offset(index, 0) - RECORD_HEADER_LEN, &mut record)?;

            if record[0] != RECORD_SENTINEL {
                return Err(ElevationError::InvalidSentinel {
                    path: path.to_path_buf(),
                    expected: "data record (0xAA)",
                    found: format!("{:#04x} in record {}", record[0], index),
                });
            }

            let computed = record_checksum(&record[..body_len]);
            let stored = u32::from_be_bytes([
                record[body_len],
                record[body_len + 1],
                record[body_len + 2],
                record[body_len + 3],
            ]);
            if computed != stored {
                return Err(ElevationError::ChecksumMismatch {
                    path: path.to_path_buf(),
                    record: index,
                    stored,
                    computed,
                });
            }
        }
        Ok(())
    }
}

/// Unsigned byte sum of a data record's header and posts.
pub fn record_checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |sum, &b| sum.wrapping_add(u32::from(b)))
}

fn field(record: &[u8], range: Range<usize>) -> &str {
    record
        .get(range)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .unwrap_or("")
}

fn expect_sentinel(path: &Path, record: &[u8], sentinel: &'static str) -> Result<()> {
    let found = field(record, 0..3);
    if found == sentinel {
        Ok(())
    } else {
        Err(ElevationError::InvalidSentinel {
            path: path.to_path_buf(),
            expected: sentinel,
            found: String::from_utf8_lossy(&record[..3.min(record.len())]).into_owned(),
        })
    }
}

fn invalid_field(path: &Path, name: &'static str, value: &str) -> ElevationError {
    ElevationError::InvalidHeader {
        path: path.to_path_buf(),
        field: name,
        value: value.to_string(),
    }
}

/// `DDDMMSSH` to signed decimal degrees.
fn parse_dms(path: &Path, name: &'static str, value: &str) -> Result<f64> {
    let bytes = value.as_bytes();
    if bytes.len() != 8 || !bytes[..7].iter().all(u8::is_ascii_digit) {
        return Err(invalid_field(path, name, value));
    }

    let number = |range: Range<usize>| -> f64 {
        value[range].parse::<u32>().map(f64::from).unwrap_or(0.0)
    };
    let degrees = number(0..3) + number(3..5) / 60.0 + number(5..7) / 3600.0;

    match bytes[7].to_ascii_uppercase() {
        b'N' | b'E' => Ok(degrees),
        b'S' | b'W' => Ok(-degrees),
        _ => Err(invalid_field(path, name, value)),
    }
}

fn parse_count(path: &Path, name: &'static str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid_field(path, name, value))
}

/// Numeric field that may hold `NA` or blanks.
fn parse_optional(value: &str) -> Option<u32> {
    value.trim().parse().ok()
}

/// Level from the DSI series designator, else from the file extension.
fn parse_level(path: &Path, designator: &str) -> Result<u8> {
    let from_dsi = designator
        .strip_prefix("DTED")
        .and_then(|level| level.trim().parse::<u8>().ok())
        .filter(|level| *level <= 2);

    from_dsi
        .or_else(|| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .and_then(dted_extension_level)
        })
        .ok_or_else(|| invalid_field(path, "DSI series designator", designator))
}

/// A DTED cell.
///
/// The header is parsed (and checksums verified) when the cell is opened.
/// Posts are then read on demand from the memory map or file stream.
#[derive(Debug)]
pub struct DtedCell {
    path: PathBuf,
    options: CellOptions,
    header: DtedHeader,
    geometry: GridGeometry,
    slot: SourceSlot<PostSource>,
}

impl DtedCell {
    /// Open and validate a DTED file.
    pub fn open<P: AsRef<Path>>(path: P, options: CellOptions) -> Result<Self> {
        let path = path.as_ref();
        let source = open_source(path, options.access)?;
        let header = DtedHeader::parse(&source, path, options.verify_checksums)?;

        tracing::debug!(
            path = %path.display(),
            level = header.level,
            rows = header.lat_points,
            cols = header.lon_lines,
            "opened DTED cell"
        );

        Ok(Self {
            path: path.to_path_buf(),
            options,
            geometry: header.geometry(),
            header,
            slot: SourceSlot::open(path, source),
        })
    }

    pub fn header(&self) -> &DtedHeader {
        &self.header
    }

    fn read_post(&self, source: &PostSource, row: usize, col: usize) -> io::Result<Option<f64>> {
        // Records run south to north; grid rows run north to south.
        let offset = self.header.post_offset(col, self.geometry.rows - 1 - row);
        let word = source.read_word(offset)?;
        Ok(PostCodec::DTED.decode(word).map(f64::from))
    }

    /// Re-read the file after a close; the header must be unchanged.
    fn reload(&self) -> Result<PostSource> {
        let source = open_source(&self.path, self.options.access)?;
        let header = DtedHeader::parse(&source, &self.path, self.options.verify_checksums)?;
        if header != self.header {
            return Err(ElevationError::InvalidHeader {
                path: self.path.clone(),
                field: "UHL",
                value: "changed since the cell was first opened".to_string(),
            });
        }
        Ok(source)
    }
}

impl CellHandler for DtedCell {
    fn format(&self) -> CellFormat {
        CellFormat::Dted
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<()> {
        self.slot.reopen_with(|| self.reload())
    }

    fn close(&self) {
        self.slot.close();
    }

    fn status(&self) -> CellStatus {
        self.slot.status()
    }

    fn bounds(&self) -> CellBounds {
        self.geometry.bounds()
    }

    fn size_of_elev_cell(&self) -> (usize, usize) {
        (self.geometry.rows, self.geometry.cols)
    }

    fn mean_spacing_meters(&self) -> f64 {
        self.geometry.mean_spacing_meters()
    }

    fn post(&self, row: usize, col: usize) -> Result<Option<f64>> {
        let (rows, cols) = self.size_of_elev_cell();
        if row >= rows || col >= cols {
            return Err(ElevationError::OutOfBounds {
                lat: self.geometry.north - row as f64 * self.geometry.lat_spacing,
                lon: self.geometry.west + col as f64 * self.geometry.lon_spacing,
            });
        }

        self.slot.read(|source| self.read_post(source, row, col))
    }

    fn height_above_msl(&self, point: &GeoPoint) -> Result<f64> {
        let position = self.geometry.position(point)?;
        // Every corner is read from one snapshot of the source, so a close
        // racing this query cannot fail it halfway.
        self.slot.read(|source| {
            interpolate(&position, |row, col| self.read_post(source, row, col))
        })
    }

    fn accuracy_info(&self, point: &GeoPoint) -> Option<AccuracyInfo> {
        self.bounds()
            .contains(point)
            .then(|| self.header.accuracy())
    }
}
