//! Single-band GeoTIFF DEM cells.
//!
//! Georeferencing comes from `ModelTiepoint` + `ModelPixelScale`; the raster
//! type key of the GeoKey directory decides whether pixel values sit on pixel
//! corners (`PixelIsPoint`) or pixel centers (`PixelIsArea`, the default).
//! `GDAL_NODATA` and NaN samples are NULL posts.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use super::source::SourceSlot;
use super::{AccuracyInfo, CellFormat, CellHandler, CellStatus, GridGeometry};
use crate::error::{ElevationError, Result};
use crate::geo::{CellBounds, GeoPoint};
use crate::post::interpolate;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoKey holding the raster type.
const GT_RASTER_TYPE_KEY: u16 = 1025;
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Tolerance when matching the nodata value.
const NODATA_EPSILON: f64 = 0.001;

type TiffDecoder = Decoder<BufReader<File>>;

/// Georeferencing of a GeoTIFF, read without decoding pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    pub path: PathBuf,
    pub width: usize,
    pub height: usize,
    /// Placement of the pixel values, one post per pixel.
    pub geometry: GridGeometry,
    pub nodata: Option<f64>,
    pub pixel_is_point: bool,
}

impl ImageHeader {
    /// Read dimensions and georeferencing tags of `path`.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;
        Self::from_decoder(&mut decoder, path)
    }

    fn from_decoder(decoder: &mut TiffDecoder, path: &Path) -> Result<Self> {
        let invalid = |reason: &str| ElevationError::InvalidGeoTiff {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if !matches!(decoder.colortype()?, ColorType::Gray(_)) {
            return Err(invalid("expected a single-band image"));
        }

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);
        if width < 2 || height < 2 {
            return Err(invalid("image must be at least 2x2 pixels"));
        }

        let tiepoint = decoder
            .get_tag_f64_vec(tag(MODEL_TIEPOINT))
            .map_err(|_| invalid("missing ModelTiepoint tag"))?;
        let scale = decoder
            .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
            .map_err(|_| invalid("missing ModelPixelScale tag"))?;
        if tiepoint.len() < 6 || scale.len() < 2 {
            return Err(invalid("short ModelTiepoint or ModelPixelScale"));
        }

        let (tie_i, tie_j, tie_x, tie_y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let (scale_x, scale_y) = (scale[0], scale[1]);
        if !(scale_x > 0.0 && scale_y > 0.0) {
            return Err(invalid("pixel scale must be positive"));
        }

        let pixel_is_point = read_raster_type(decoder) == Some(RASTER_PIXEL_IS_POINT);
        // PixelIsArea values describe the pixel center.
        let shift = if pixel_is_point { 0.0 } else { 0.5 };

        let geometry = GridGeometry {
            north: tie_y - (shift - tie_j) * scale_y,
            west: tie_x + (shift - tie_i) * scale_x,
            lat_spacing: scale_y,
            lon_spacing: scale_x,
            rows: height,
            cols: width,
        };

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            geometry,
            nodata: read_nodata(decoder),
            pixel_is_point,
        })
    }

    pub fn bounds(&self) -> CellBounds {
        self.geometry.bounds()
    }

    pub fn mean_spacing_meters(&self) -> f64 {
        self.geometry.mean_spacing_meters()
    }
}

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn open_decoder(path: &Path) -> Result<TiffDecoder> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ElevationError::CellNotFound {
            path: path.to_path_buf(),
        },
        _ => ElevationError::Io(e),
    })?;

    // Large DEM rasters exceed the default decoding limits
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;

    Ok(Decoder::new(BufReader::new(file))?.with_limits(limits))
}

fn read_raster_type(decoder: &mut TiffDecoder) -> Option<u16> {
    let keys = decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?;
    // Header is four shorts, then (key, location, count, value) entries.
    keys.get(4..)?
        .chunks_exact(4)
        .find(|entry| entry[0] == GT_RASTER_TYPE_KEY && entry[1] == 0)
        .map(|entry| entry[3])
}

fn read_nodata(decoder: &mut TiffDecoder) -> Option<f64> {
    let text = decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?;
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .parse::<f64>()
        .ok()
        .filter(|value| !value.is_nan())
}

fn decode_samples(decoder: &mut TiffDecoder) -> Result<Vec<f32>> {
    let samples = match decoder.read_image()? {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    };
    Ok(samples)
}

/// A GeoTIFF cell. Pixels are decoded into memory when the cell opens.
#[derive(Debug)]
pub struct ImageCell {
    header: ImageHeader,
    slot: SourceSlot<Vec<f32>>,
}

impl ImageCell {
    /// Decode a GeoTIFF.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;
        let header = ImageHeader::from_decoder(&mut decoder, path)?;
        let samples = Self::decode(&mut decoder, &header)?;

        tracing::debug!(
            path = %path.display(),
            width = header.width,
            height = header.height,
            "decoded GeoTIFF cell"
        );

        Ok(Self {
            slot: SourceSlot::open(path, samples),
            header,
        })
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    fn decode(decoder: &mut TiffDecoder, header: &ImageHeader) -> Result<Vec<f32>> {
        let samples = decode_samples(decoder)?;
        if samples.len() != header.width * header.height {
            return Err(ElevationError::InvalidGeoTiff {
                path: header.path.clone(),
                reason: format!(
                    "decoded {} samples for a {}x{} image",
                    samples.len(),
                    header.width,
                    header.height
                ),
            });
        }
        Ok(samples)
    }

    fn reload(&self) -> Result<Vec<f32>> {
        let mut decoder = open_decoder(&self.header.path)?;
        let header = ImageHeader::from_decoder(&mut decoder, &self.header.path)?;
        if header != self.header {
            return Err(ElevationError::InvalidGeoTiff {
                path: self.header.path.clone(),
                reason: "georeferencing changed since the cell was first opened".to_string(),
            });
        }
        Self::decode(&mut decoder, &header)
    }

    fn sample(&self, samples: &[f32], row: usize, col: usize) -> Option<f64> {
        samples
            .get(row * self.header.width + col)
            .copied()
            .filter(|value| !self.is_null(*value))
            .map(f64::from)
    }

    fn is_null(&self, value: f32) -> bool {
        value.is_nan()
            || self
                .header
                .nodata
                .is_some_and(|nodata| (f64::from(value) - nodata).abs() < NODATA_EPSILON)
    }
}

impl CellHandler for ImageCell {
    fn format(&self) -> CellFormat {
        CellFormat::Image
    }

    fn path(&self) -> &Path {
        &self.header.path
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
        self.header.bounds()
    }

    fn size_of_elev_cell(&self) -> (usize, usize) {
        (self.header.height, self.header.width)
    }

    fn mean_spacing_meters(&self) -> f64 {
        self.header.mean_spacing_meters()
    }

    fn post(&self, row: usize, col: usize) -> Result<Option<f64>> {
        let samples = self.slot.acquire()?;
        if row >= self.header.height || col >= self.header.width {
            return Err(ElevationError::OutOfBounds {
                lat: self.header.geometry.north - row as f64 * self.header.geometry.lat_spacing,
                lon: self.header.geometry.west + col as f64 * self.header.geometry.lon_spacing,
            });
        }
        Ok(self.sample(&samples, row, col))
    }

    fn height_above_msl(&self, point: &GeoPoint) -> Result<f64> {
        let position = self.header.geometry.position(point)?;
        let samples = self.slot.acquire()?;
        interpolate(&position, |row, col| {
            Ok::<_, ElevationError>(self.sample(&samples, row, col))
        })
    }

    /// GeoTIFF DEMs carry no accuracy metadata.
    fn accuracy_info(&self, _point: &GeoPoint) -> Option<AccuracyInfo> {
        None
    }
}
