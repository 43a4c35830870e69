// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Binary point record layout for PointCloud2 messages.
//!
//! Every point is a fixed 28-byte little-endian record:
//!
//! ```text
//! ┌───────┬───────┬───────┬──────────┬───────────┬──────────┬─────────────┬──────────────┐
//! │ x:f32 │ y:f32 │ z:f32 │ dist:f32 │ inten:f32 │ ring:u16 │ azimuth:u16 │ delta_ns:u32 │
//! │ 0     │ 4     │ 8     │ 12       │ 16        │ 20       │ 22          │ 24           │
//! └───────┴───────┴───────┴──────────┴───────────┴──────────┴─────────────┴──────────────┘
//! ```
//!
//! The offsets below are the single source of truth for both the encoder and
//! the [`point_fields`] descriptors published alongside the data.

use edgefirst_schemas::sensor_msgs::PointField;

/// Size of one point record in bytes.
pub const POINT_STEP: usize = 28;

pub const X_OFFSET: usize = 0;
pub const Y_OFFSET: usize = 4;
pub const Z_OFFSET: usize = 8;
pub const DISTANCE_OFFSET: usize = 12;
pub const INTENSITY_OFFSET: usize = 16;
pub const RING_OFFSET: usize = 20;
pub const AZIMUTH_OFFSET: usize = 22;
pub const DELTA_NS_OFFSET: usize = 24;

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

/// One decoded point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    /// Cartesian coordinates in meters
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Corrected radial distance in meters
    pub distance: f32,
    /// Calibrated intensity, 0-255
    pub intensity: f32,
    /// Laser channel id
    pub ring: u16,
    /// Azimuth in hundredths of a degree
    pub azimuth: u16,
    /// Firing time in nanoseconds after the cloud stamp
    pub delta_ns: u32,
}

fn field(name: &str, offset: usize, datatype: PointFieldType) -> PointField {
    PointField {
        name: String::from(name),
        offset: offset as u32,
        datatype: datatype as u8,
        count: 1,
    }
}

/// Field descriptors of the 28-byte point record.
pub fn point_fields() -> Vec<PointField> {
    vec![
        field("x", X_OFFSET, PointFieldType::FLOAT32),
        field("y", Y_OFFSET, PointFieldType::FLOAT32),
        field("z", Z_OFFSET, PointFieldType::FLOAT32),
        field("distance", DISTANCE_OFFSET, PointFieldType::FLOAT32),
        field("intensity", INTENSITY_OFFSET, PointFieldType::FLOAT32),
        field("ring", RING_OFFSET, PointFieldType::UINT16),
        field("azimuth", AZIMUTH_OFFSET, PointFieldType::UINT16),
        field("delta_ns", DELTA_NS_OFFSET, PointFieldType::UINT32),
    ]
}

/// Encode `point` into the first [`POINT_STEP`] bytes of `out`.
///
/// # Panics
///
/// Panics if `out` is shorter than [`POINT_STEP`].
#[inline]
pub fn write_point(out: &mut [u8], point: &Point) {
    let out = &mut out[..POINT_STEP];
    out[X_OFFSET..X_OFFSET + 4].copy_from_slice(&point.x.to_le_bytes());
    out[Y_OFFSET..Y_OFFSET + 4].copy_from_slice(&point.y.to_le_bytes());
    out[Z_OFFSET..Z_OFFSET + 4].copy_from_slice(&point.z.to_le_bytes());
    out[DISTANCE_OFFSET..DISTANCE_OFFSET + 4].copy_from_slice(&point.distance.to_le_bytes());
    out[INTENSITY_OFFSET..INTENSITY_OFFSET + 4].copy_from_slice(&point.intensity.to_le_bytes());
    out[RING_OFFSET..RING_OFFSET + 2].copy_from_slice(&point.ring.to_le_bytes());
    out[AZIMUTH_OFFSET..AZIMUTH_OFFSET + 2].copy_from_slice(&point.azimuth.to_le_bytes());
    out[DELTA_NS_OFFSET..DELTA_NS_OFFSET + 4].copy_from_slice(&point.delta_ns.to_le_bytes());
}

#[inline]
fn f32_at(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Decode the point record at the start of `data`.
///
/// # Panics
///
/// Panics if `data` is shorter than [`POINT_STEP`].
#[inline]
pub fn read_point(data: &[u8]) -> Point {
    let data = &data[..POINT_STEP];
    Point {
        x: f32_at(data, X_OFFSET),
        y: f32_at(data, Y_OFFSET),
        z: f32_at(data, Z_OFFSET),
        distance: f32_at(data, DISTANCE_OFFSET),
        intensity: f32_at(data, INTENSITY_OFFSET),
        ring: u16::from_le_bytes([data[RING_OFFSET], data[RING_OFFSET + 1]]),
        azimuth: u16::from_le_bytes([data[AZIMUTH_OFFSET], data[AZIMUTH_OFFSET + 1]]),
        delta_ns: u32::from_le_bytes([
            data[DELTA_NS_OFFSET],
            data[DELTA_NS_OFFSET + 1],
            data[DELTA_NS_OFFSET + 2],
            data[DELTA_NS_OFFSET + 3],
        ]),
    }
}
