//! Frame carrier.
//!
//! A `Frame` is the unit handed to the tracker each tick and to the snapshot
//! store when an alert fires. Pixel data is tightly-packed RGB8; the buffer
//! length is checked against the dimensions at construction so downstream
//! encoders never have to.

use anyhow::{anyhow, Result};

/// One RGB8 frame.
pub struct Frame {
    /// Pixel data, row-major RGB8. Length is always `width * height * 3`.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, {}x{} RGB needs {}",
                data.len(),
                width,
                height,
                expected
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Deterministic synthetic frame for the daemon and demo runs.
    ///
    /// Fills the buffer with a pattern mixing position and sequence number so
    /// consecutive frames differ without any capture hardware involved.
    pub fn synthetic(width: u32, height: u32, seq: u64) -> Self {
        let pixel_count = (width as usize) * (height as usize) * 3;
        let mut data = vec![0u8; pixel_count];
        for (i, pixel) in data.iter_mut().enumerate() {
            *pixel = ((i as u64 + seq) % 256) as u8;
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}
