use std::fmt::Debug;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, PyramidResult};

/// The pixel types a format reader may report.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    Bit,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float,
    Double,
}

/// The closed set of sample types a pyramid can hold.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SampleType {
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "uint16")]
    U16,
    /// Three interleaved 8-bit channels packed into one ARGB value with an alpha of 0.
    #[serde(rename = "rgb24")]
    Rgb24,
    #[serde(rename = "float32")]
    F32,
    /// A real-valued 3D vector per sample, as produced by sampling coordinate transforms.
    #[serde(rename = "vector3")]
    Vector3,
}

impl SampleType {
    /// Maps a reader's pixel type to the sample type a pyramid over it holds.
    pub fn from_reader(pixel_type: PixelType, rgb: bool) -> PyramidResult<Self> {
        match (pixel_type, rgb) {
            (PixelType::Uint8, false) => Ok(SampleType::U8),
            (PixelType::Uint16, false) => Ok(SampleType::U16),
            (PixelType::Uint8, true) => Ok(SampleType::Rgb24),
            (PixelType::Float, false) => Ok(SampleType::F32),
            (pixel_type, rgb) => Err(PyramidError::unsupported_sample_type(format!(
                "{pixel_type:?}{}",
                if rgb { " (rgb)" } else { "" }
            ))),
        }
    }

    /// The number of bytes a reader delivers per sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 => 2,
            SampleType::Rgb24 => 3,
            SampleType::F32 => 4,
            SampleType::Vector3 => 24,
        }
    }

    /// Fails unless raw reader bytes in `layout` can be decoded into this sample type.
    pub fn check_layout(&self, layout: ByteLayout) -> PyramidResult<()> {
        match self {
            SampleType::Rgb24 if !layout.interleaved => Err(PyramidError::unsupported_sample_type(
                "planar rgb, only interleaved rgb is supported",
            )),
            SampleType::Vector3 => Err(PyramidError::unsupported_sample_type(
                "vector samples cannot be decoded from a reader",
            )),
            _ => Ok(()),
        }
    }
}

/// How a reader lays out the bytes of a plane.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct ByteLayout {
    #[serde(rename = "littleEndian")]
    pub little_endian: bool,

    /// Whether the channels of an RGB pixel are stored next to each other.
    pub interleaved: bool,
}

/// A packed 32-bit ARGB color.
#[repr(transparent)]
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct Argb(pub u32);

impl Argb {
    /// Packs an RGB triplet with an alpha of 0.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub fn alpha(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn red(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(&self) -> u8 {
        self.0 as u8
    }
}

/// A sample that can be stored in a pyramid, decoded from reader bytes and interpolated.
///
/// Samples expose their value as `COMPONENTS` real numbers. Interpolation blends each component
/// independently and converts the result back with `from_components`, which rounds and clamps for
/// integer samples.
pub trait Sample: bytemuck::Pod + Debug + PartialEq + Send + Sync {
    const SAMPLE_TYPE: SampleType;
    const COMPONENTS: usize;

    fn write_components(self, out: &mut [f64]);

    fn from_components(components: &[f64]) -> Self;

    /// Decodes `bytes` delivered by a reader in `layout`, appending to `out`.
    /// The caller guarantees that `bytes` holds a whole number of samples.
    fn decode(bytes: &[u8], layout: ByteLayout, out: &mut Vec<Self>) -> PyramidResult<()>;
}

fn round_clamped(value: f64, max: f64) -> f64 {
    value.round().clamp(0.0, max)
}

impl Sample for u8 {
    const SAMPLE_TYPE: SampleType = SampleType::U8;
    const COMPONENTS: usize = 1;

    fn write_components(self, out: &mut [f64]) {
        out[0] = self as f64;
    }

    fn from_components(components: &[f64]) -> Self {
        round_clamped(components[0], u8::MAX as f64) as u8
    }

    fn decode(bytes: &[u8], _layout: ByteLayout, out: &mut Vec<Self>) -> PyramidResult<()> {
        out.extend_from_slice(bytes);
        Ok(())
    }
}

impl Sample for u16 {
    const SAMPLE_TYPE: SampleType = SampleType::U16;
    const COMPONENTS: usize = 1;

    fn write_components(self, out: &mut [f64]) {
        out[0] = self as f64;
    }

    fn from_components(components: &[f64]) -> Self {
        round_clamped(components[0], u16::MAX as f64) as u16
    }

    fn decode(bytes: &[u8], layout: ByteLayout, out: &mut Vec<Self>) -> PyramidResult<()> {
        let samples = bytes.chunks_exact(2).map(|b| {
            if layout.little_endian {
                (b[0] as u16) | ((b[1] as u16) << 8)
            } else {
                ((b[0] as u16) << 8) | (b[1] as u16)
            }
        });
        out.extend(samples);
        Ok(())
    }
}

impl Sample for f32 {
    const SAMPLE_TYPE: SampleType = SampleType::F32;
    const COMPONENTS: usize = 1;

    fn write_components(self, out: &mut [f64]) {
        out[0] = self as f64;
    }

    fn from_components(components: &[f64]) -> Self {
        components[0] as f32
    }

    fn decode(bytes: &[u8], layout: ByteLayout, out: &mut Vec<Self>) -> PyramidResult<()> {
        let samples = bytes.chunks_exact(4).map(|b| {
            let b = [b[0], b[1], b[2], b[3]];
            if layout.little_endian {
                f32::from_le_bytes(b)
            } else {
                f32::from_be_bytes(b)
            }
        });
        out.extend(samples);
        Ok(())
    }
}

impl Sample for Argb {
    const SAMPLE_TYPE: SampleType = SampleType::Rgb24;
    const COMPONENTS: usize = 3;

    fn write_components(self, out: &mut [f64]) {
        out[0] = self.red() as f64;
        out[1] = self.green() as f64;
        out[2] = self.blue() as f64;
    }

    fn from_components(components: &[f64]) -> Self {
        let channel = |c: f64| round_clamped(c, u8::MAX as f64) as u8;
        Argb::from_rgb(
            channel(components[0]),
            channel(components[1]),
            channel(components[2]),
        )
    }

    fn decode(bytes: &[u8], layout: ByteLayout, out: &mut Vec<Self>) -> PyramidResult<()> {
        SampleType::Rgb24.check_layout(layout)?;
        out.extend(
            bytes
                .chunks_exact(3)
                .map(|rgb| Argb::from_rgb(rgb[0], rgb[1], rgb[2])),
        );
        Ok(())
    }
}

impl Sample for DVec3 {
    const SAMPLE_TYPE: SampleType = SampleType::Vector3;
    const COMPONENTS: usize = 3;

    fn write_components(self, out: &mut [f64]) {
        out.copy_from_slice(&self.to_array());
    }

    fn from_components(components: &[f64]) -> Self {
        DVec3::new(components[0], components[1], components[2])
    }

    fn decode(_bytes: &[u8], layout: ByteLayout, _out: &mut Vec<Self>) -> PyramidResult<()> {
        SampleType::Vector3.check_layout(layout)
    }
}
