//! Packed record layouts shared with the noise kernel.
//!
//! These structs are uploaded byte-for-byte and must match the struct
//! declarations in `noise.wgsl`. All fields are 4-byte scalars so the WGSL
//! storage layout equals the `#[repr(C)]` layout:
//!
//! | record           | offset | field       | type |
//! |------------------|--------|-------------|------|
//! | `SimplexRecord`  | 0      | seed        | i32  |
//! |                  | 4      | num_layers  | i32  |
//! |                  | 8      | scale       | f32  |
//! |                  | 12     | persistence | f32  |
//! |                  | 16     | lacunarity  | f32  |
//! |                  | 20     | weight      | f32  |
//! |                  | 24..32 | padding     |      |
//! | `WorleyRecord`   | 0      | seed        | i32  |
//! |                  | 4      | num_layers  | i32  |
//! |                  | 8      | num_points  | i32  |
//! |                  | 12     | lacunarity  | f32  |
//! |                  | 16     | persistence | f32  |
//! |                  | 20     | weight      | f32  |
//! |                  | 24     | invert      | u32  |
//! |                  | 28     | padding     |      |
//!
//! Point and offset buffers are tightly packed `[f32; 3]` (stride 12) and read
//! by the kernel as a flat `array<f32>`.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::error::{NoiseError, NoiseResult};

/// Stride of one scatter point or offset vector
pub const VEC3_STRIDE: usize = size_of::<[f32; 3]>();

/// Stride of one scratch diagnostic element
pub const SCRATCH_STRIDE: usize = size_of::<i32>();

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimplexRecord {
    pub seed: i32,
    pub num_layers: i32,
    pub scale: f32,
    pub persistence: f32,
    pub lacunarity: f32,
    pub weight: f32,
    pub _padding: [u32; 2],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct WorleyRecord {
    pub seed: i32,
    pub num_layers: i32,
    pub num_points: i32,
    pub lacunarity: f32,
    pub persistence: f32,
    pub weight: f32,
    pub invert: u32,
    pub _padding: u32,
}

impl SimplexRecord {
    pub const SIZE: usize = 32;
}

impl WorleyRecord {
    pub const SIZE: usize = 32;
}

const_assert_eq!(size_of::<SimplexRecord>(), SimplexRecord::SIZE);
const_assert_eq!(size_of::<WorleyRecord>(), WorleyRecord::SIZE);
const_assert_eq!(VEC3_STRIDE, 12);

/// One documented field of a packed record
#[derive(Debug, Clone, Copy)]
pub struct FieldOffset {
    pub name: &'static str,
    pub expected: usize,
    pub actual: usize,
}

/// Documented layout of a packed record, checked at pipeline startup
#[derive(Debug, Clone, Copy)]
pub struct RecordLayout {
    pub record: &'static str,
    pub size: usize,
    pub fields: &'static [FieldOffset],
}

macro_rules! field {
    ($ty:ty, $field:ident, $expected:expr) => {
        FieldOffset {
            name: stringify!($field),
            expected: $expected,
            actual: offset_of!($ty, $field),
        }
    };
}

pub const SIMPLEX_LAYOUT: RecordLayout = RecordLayout {
    record: "SimplexRecord",
    size: SimplexRecord::SIZE,
    fields: &[
        field!(SimplexRecord, seed, 0),
        field!(SimplexRecord, num_layers, 4),
        field!(SimplexRecord, scale, 8),
        field!(SimplexRecord, persistence, 12),
        field!(SimplexRecord, lacunarity, 16),
        field!(SimplexRecord, weight, 20),
    ],
};

pub const WORLEY_LAYOUT: RecordLayout = RecordLayout {
    record: "WorleyRecord",
    size: WorleyRecord::SIZE,
    fields: &[
        field!(WorleyRecord, seed, 0),
        field!(WorleyRecord, num_layers, 4),
        field!(WorleyRecord, num_points, 8),
        field!(WorleyRecord, lacunarity, 12),
        field!(WorleyRecord, persistence, 16),
        field!(WorleyRecord, weight, 20),
        field!(WorleyRecord, invert, 24),
    ],
};

impl RecordLayout {
    /// Check every documented offset against the compiled layout
    pub fn verify(&self) -> NoiseResult<()> {
        for field in self.fields {
            if field.expected != field.actual {
                return Err(NoiseError::LayoutMismatch {
                    record: self.record,
                    field: field.name,
                    expected: field.expected,
                    found: field.actual,
                });
            }
            if field.actual + 4 > self.size {
                return Err(NoiseError::LayoutMismatch {
                    record: self.record,
                    field: field.name,
                    expected: self.size,
                    found: field.actual + 4,
                });
            }
        }
        Ok(())
    }
}

/// Verify all records the kernel consumes
pub fn verify_all() -> NoiseResult<()> {
    SIMPLEX_LAYOUT.verify()?;
    WORLEY_LAYOUT.verify()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_verify() {
        assert!(verify_all().is_ok());
    }

    #[test]
    fn test_mismatch_is_reported() {
        const BROKEN: RecordLayout = RecordLayout {
            record: "WorleyRecord",
            size: WorleyRecord::SIZE,
            fields: &[FieldOffset {
                name: "num_points",
                expected: 12,
                actual: std::mem::offset_of!(WorleyRecord, num_points),
            }],
        };

        match BROKEN.verify() {
            Err(NoiseError::LayoutMismatch {
                field,
                expected,
                found,
                ..
            }) => {
                assert_eq!(field, "num_points");
                assert_eq!(expected, 12);
                assert_eq!(found, 8);
            }
            other => panic!("expected layout mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_worley_record_bytes() {
        let record = WorleyRecord {
            seed: 1,
            num_layers: 2,
            num_points: 3,
            lacunarity: 2.0,
            persistence: 0.5,
            weight: 1.0,
            invert: 1,
            _padding: 0,
        };
        let bytes = bytemuck::bytes_of(&record);
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[8..12], &3i32.to_ne_bytes());
        assert_eq!(&bytes[12..16], &2.0f32.to_ne_bytes());
        assert_eq!(&bytes[24..28], &1u32.to_ne_bytes());
    }
}
