//! DTED and SRTM writers. Also compiled into the integration tests, whose
//! parent module supplies the same imports from `elevdb`.

use std::fs;
use std::path::{Path, PathBuf};

use super::{encode_signed_magnitude, record_checksum, RECORD_SENTINEL};

/// Byte length of the UHL, DSI and ACC records together.
pub const DTED_HEADER_LEN: usize = 80 + 648 + 2700;

/// Posts indexed as `(row, col)`, row 0 on the north edge.
type PostFn = Box<dyn Fn(usize, usize) -> i16>;

/// A square DTED cell to write to disk.
pub struct DtedFixture {
    lat: i32,
    lon: i32,
    points: usize,
    level: u8,
    horizontal: Option<u32>,
    vertical: Option<u32>,
    labels: bool,
    posts: PostFn,
}

impl DtedFixture {
    /// `points` posts per side spanning one degree; `36000 / (points - 1)`
    /// must fit the four-digit interval field.
    pub fn new(lat: i32, lon: i32, points: usize) -> Self {
        Self {
            lat,
            lon,
            points,
            level: 1,
            horizontal: Some(50),
            vertical: Some(30),
            labels: false,
            posts: Box::new(|row, col| (row + col) as i16),
        }
    }

    pub fn with_posts(mut self, posts: impl Fn(usize, usize) -> i16 + 'static) -> Self {
        self.posts = Box::new(posts);
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn with_accuracy(mut self, horizontal: Option<u32>, vertical: Option<u32>) -> Self {
        self.horizontal = horizontal;
        self.vertical = vertical;
        self
    }

    /// Prefix VOL and HDR tape labels.
    pub fn with_labels(mut self) -> Self {
        self.labels = true;
        self
    }

    pub fn record_size(&self) -> usize {
        8 + self.points * 2 + 4
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let n = self.points;
        let interval = 36_000 / (n - 1);
        let mut bytes = Vec::new();

        if self.labels {
            bytes.extend(padded("VOL1", 80));
            bytes.extend(padded("HDR1", 80));
        }

        let uhl = format!(
            "UHL1{:03}0000{}{:03}0000{}{:04}{:04}NA  U  {:12}{:04}{:04}0",
            self.lon.unsigned_abs(),
            if self.lon < 0 { 'W' } else { 'E' },
            self.lat.unsigned_abs(),
            if self.lat < 0 { 'S' } else { 'N' },
            interval,
            interval,
            "",
            n,
            n,
        );
        bytes.extend(padded(&uhl, 80));

        let mut dsi = padded("DSIU", 648);
        dsi[59..64].copy_from_slice(format!("DTED{}", self.level).as_bytes());
        bytes.extend(dsi);

        let acc = format!(
            "ACC{}{}",
            accuracy_field(self.horizontal),
            accuracy_field(self.vertical)
        );
        bytes.extend(padded(&acc, 2700));

        for col in 0..n {
            let mut record = vec![RECORD_SENTINEL];
            record.extend(&(col as u32).to_be_bytes()[1..]);
            record.extend((col as u16).to_be_bytes());
            record.extend(0u16.to_be_bytes());
            // South to north within a record.
            for index in 0..n {
                let value = (self.posts)(n - 1 - index, col);
                record.extend(encode_signed_magnitude(value).to_be_bytes());
            }
            let checksum = record_checksum(&record);
            record.extend(checksum.to_be_bytes());
            bytes.extend(record);
        }

        bytes
    }
}

fn padded(text: &str, len: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(len, b' ');
    bytes
}

fn accuracy_field(value: Option<u32>) -> String {
    value.map_or_else(|| "NA  ".to_string(), |v| format!("{v:04}"))
}

/// Write `fixture` to `root/relative`, creating directories.
pub fn write_dted(root: &Path, relative: &str, fixture: &DtedFixture) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, fixture.to_bytes()).unwrap();
    path
}

/// Write an `n × n` SRTM tile. `post(row, col)` has row 0 on the north edge.
pub fn write_srtm(
    root: &Path,
    name: &str,
    samples: usize,
    post: impl Fn(usize, usize) -> i16,
) -> PathBuf {
    let mut bytes = Vec::with_capacity(samples * samples * 2);
    for row in 0..samples {
        for col in 0..samples {
            bytes.extend(post(row, col).to_be_bytes());
        }
    }
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, bytes).unwrap();
    path
}

/// `row * 100 + col`, so every post identifies its position.
pub fn gradient(row: usize, col: usize) -> i16 {
    (row * 100 + col) as i16
}
