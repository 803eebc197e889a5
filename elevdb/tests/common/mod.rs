//! On-disk cell writers for the integration tests, shared with the unit tests.

#![allow(dead_code)]

use elevdb::cell::dted::{record_checksum, RECORD_SENTINEL};
use elevdb::post::encode_signed_magnitude;

#[path = "../../src/test_support/fixtures.rs"]
mod fixtures;

pub use fixtures::{gradient, write_dted, write_srtm, DtedFixture, DTED_HEADER_LEN};
