// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst Velodyne Decoder Library
//!
//! Turns raw Velodyne UDP data packets into calibrated, timestamped points
//! packed in PointCloud2 layout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │  RawPacket   │ ──► │  Transformer  │ ──► │ PointBuffer  │
//! │ (1206 bytes) │     │ + Calibration │     │(client-owned)│
//! └──────────────┘     └───────────────┘     └──────────────┘
//!                                                   │
//!                                                   ▼
//!                                        sensor_msgs/PointCloud2
//! ```
//!
//! The client owns the point buffer and decides how many packets go into one
//! cloud:
//! 1. Build a [`calibration::Calibration`] once per sensor
//! 2. Create a [`buffer::PointBuffer`] with a reference stamp and capacity
//! 3. Decode each datagram with [`packet::RawPacket::new`]
//! 4. Append its points with [`transform::Transformer::unpack`]
//! 5. Trim the buffer or convert it into a PointCloud2 message
//!
//! # Modules
//!
//! - [`lidar`]: Error type, sensor models and trailer codes
//! - [`packet`]: Zero-copy packet decoding and GPS timestamps
//! - [`calibration`]: Per-laser corrections and precomputed tables
//! - [`transform`]: Calibrated point computation
//! - [`buffer`]: Packed point cloud buffer
//! - [`formats`]: PointCloud2 record layout
//! - [`pcap_source`]: Capture file replay (feature `pcap`)
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::{
//!     buffer::PointBuffer,
//!     calibration::{Calibration, CalibrationConfig},
//!     lidar::Model,
//!     packet::{MAX_POINTS_PER_PACKET, RawPacket},
//!     transform::Transformer,
//! };
//!
//! let calibration = Calibration::new(&CalibrationConfig::nominal(Model::Vlp16)?);
//! let transformer = Transformer::new(&calibration);
//!
//! loop {
//!     let len = socket.recv(&mut buf)?;
//!     let packet = RawPacket::new(&buf[..len])?;
//!     let stamp = packet.stamp_now();
//!
//!     let mut cloud = PointBuffer::new(stamp, MAX_POINTS_PER_PACKET);
//!     transformer.unpack(&packet, stamp, None, &mut cloud);
//!     let msg = cloud.into_point_cloud2(String::from("velodyne"));
//! }
//! ```

pub mod buffer;
pub mod calibration;
pub mod formats;
pub mod lidar;
pub mod packet;
#[cfg(feature = "pcap")]
pub mod pcap_source;
pub mod transform;

// Re-exports for convenience
pub use buffer::PointBuffer;
pub use calibration::{Calibration, CalibrationConfig, LaserConfig};
pub use formats::{Point, PointFieldType};
pub use lidar::{Error, Model};
pub use packet::RawPacket;
#[cfg(feature = "pcap")]
pub use pcap_source::PcapSource;
pub use transform::Transformer;
