// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pre-allocated packed point cloud buffer.
//!
//! [`PointBuffer`] stores points directly in the 28-byte PointCloud2 record
//! layout defined in [`crate::formats`], so a finished cloud can be handed to
//! a publisher without a formatting pass.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use edgefirst_velodyne::{buffer::PointBuffer, formats::Point};
//!
//! let mut cloud = PointBuffer::new(Utc::now(), 384);
//! cloud.add_point(&Point { x: 1.0, ring: 3, ..Default::default() });
//!
//! assert_eq!(cloud.len(), 1);
//! assert_eq!(cloud.point(0).unwrap().ring, 3);
//!
//! cloud.trim();
//! assert_eq!(cloud.data().len(), 28);
//! ```

use crate::formats::{POINT_STEP, Point, point_fields, read_point, write_point};
use chrono::{DateTime, Utc};
use edgefirst_schemas::{
    builtin_interfaces::Time, sensor_msgs::PointCloud2, std_msgs::Header,
};

/// Append-only point cloud in packed little-endian records.
///
/// Memory is allocated once at construction. Records are never modified
/// after they are written; [`PointBuffer::trim`] only shrinks the exposed
/// byte range to the written records.
///
/// # Thread Safety
///
/// Not internally synchronized. Give each writer its own buffer.
#[derive(Debug, Clone)]
pub struct PointBuffer {
    stamp: DateTime<Utc>,
    max_points: usize,
    data: Vec<u8>,
    len: usize,
}

impl PointBuffer {
    /// Create a zero-filled buffer holding up to `max_points` points whose
    /// `delta_ns` values are relative to `stamp`.
    pub fn new(stamp: DateTime<Utc>, max_points: usize) -> Self {
        Self {
            stamp,
            max_points,
            data: vec![0; max_points * POINT_STEP],
            len: 0,
        }
    }

    /// Reference time of the cloud.
    pub fn stamp(&self) -> DateTime<Utc> {
        self.stamp
    }

    /// Returns the number of points written.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the maximum number of points.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_points
    }

    /// Points that can still be appended.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.max_points - self.len
    }

    /// Append one point.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the buffer is full. In release mode,
    /// points beyond capacity are silently ignored.
    #[inline]
    pub fn add_point(&mut self, point: &Point) {
        debug_assert!(
            self.len < self.max_points,
            "PointBuffer overflow: {} >= {}",
            self.len,
            self.max_points
        );

        if self.len < self.max_points {
            let offset = self.len * POINT_STEP;
            write_point(&mut self.data[offset..offset + POINT_STEP], point);
            self.len += 1;
        }
    }

    /// Decode the point at `index`, `None` at or beyond [`Self::len`].
    pub fn point(&self, index: usize) -> Option<Point> {
        if index >= self.len {
            return None;
        }
        let offset = index * POINT_STEP;
        Some(read_point(&self.data[offset..offset + POINT_STEP]))
    }

    /// Iterate over the written points.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.data[..self.len * POINT_STEP]
            .chunks_exact(POINT_STEP)
            .map(read_point)
    }

    /// Shrink the exposed bytes to the written points.
    ///
    /// Does not copy or reallocate. The buffer is full afterwards.
    pub fn trim(&mut self) {
        self.data.truncate(self.len * POINT_STEP);
        self.max_points = self.len;
    }

    /// Exposed bytes: the whole pre-allocated region until [`Self::trim`].
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of one record in bytes.
    pub fn point_step(&self) -> usize {
        POINT_STEP
    }

    /// Length in bytes of the written records.
    pub fn row_step(&self) -> usize {
        self.len * POINT_STEP
    }

    /// Records are always little-endian.
    pub fn is_bigendian(&self) -> bool {
        false
    }

    /// Skipped firings are never written, so every record is a valid point.
    pub fn is_dense(&self) -> bool {
        true
    }

    /// Trim and move the records into a PointCloud2 message.
    pub fn into_point_cloud2(mut self, frame_id: String) -> PointCloud2 {
        self.trim();
        let n_points = self.len;

        PointCloud2 {
            header: Header {
                stamp: Time {
                    sec: self.stamp.timestamp() as i32,
                    nanosec: self.stamp.timestamp_subsec_nanos(),
                },
                frame_id,
            },
            height: 1,
            width: n_points as u32,
            fields: point_fields(),
            is_bigendian: false,
            point_step: POINT_STEP as u32,
            row_step: (POINT_STEP * n_points) as u32,
            data: self.data,
            is_dense: true,
        }
    }
}
