// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Velodyne data packet decoder.
//!
//! # Packet Structure
//!
//! Data packets are 1206 bytes, sent on UDP port 2368:
//! - Data: 12 blocks × 100 bytes = 1200 bytes
//!   - Block id: 2 bytes (0xFFEE upper bank, 0xFFDD lower bank, ...)
//!   - Azimuth: 2 bytes, little-endian, hundredths of a degree
//!   - 32 returns × 3 bytes: distance (u16 LE), intensity (u8)
//! - GPS timestamp: 4 bytes, little-endian, microseconds since the top of
//!   the hour
//! - Return mode: 1 byte
//! - Factory id: 1 byte
//!
//! [`RawPacket`] and [`RawBlock`] are views into the caller's buffer; nothing
//! is copied during decoding.

use crate::lidar::{Error, FactoryId, Model, ReturnMode};
use chrono::{DateTime, DurationRound as _, TimeDelta, Utc};

/// Data packet total size in bytes
pub const PACKET_SIZE: usize = 1206;

/// Number of firing blocks per packet
pub const BLOCKS_PER_PACKET: usize = 12;

/// Size of each firing block in bytes
pub const BLOCK_SIZE: usize = 100;

/// Size of the block id and azimuth preceding the returns
pub const BLOCK_HEADER_SIZE: usize = 4;

/// Number of returns (channel slots) in one block
pub const SCANS_PER_BLOCK: usize = 32;

/// Size of one return in bytes
pub const RAW_SCAN_SIZE: usize = 3;

/// Upper bound on points produced by one packet
pub const MAX_POINTS_PER_PACKET: usize = BLOCKS_PER_PACKET * SCANS_PER_BLOCK;

/// Azimuth units in one revolution (0.01° resolution)
pub const ROTATION_MAX_UNITS: u16 = 36000;

/// Block id for lasers 0-31 (bytes 0xFF 0xEE on the wire)
pub const UPPER_BANK: u16 = 0xeeff;
/// Block id for lasers 32-63
pub const LOWER_BANK: u16 = 0xddff;
/// VLS-128 block id for lasers 64-95
pub const BANK_3: u16 = 0xccff;
/// VLS-128 block id for lasers 96-127
pub const BANK_4: u16 = 0xbbff;

const TIMESTAMP_OFFSET: usize = BLOCKS_PER_PACKET * BLOCK_SIZE;
const RETURN_MODE_OFFSET: usize = TIMESTAMP_OFFSET + 4;
const FACTORY_ID_OFFSET: usize = RETURN_MODE_OFFSET + 1;

/// One 100-byte firing block borrowed from a packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RawBlock<'a> {
    slice: &'a [u8],
}

impl<'a> RawBlock<'a> {
    /// Bank marker identifying which laser group the block carries.
    pub fn block_id(&self) -> u16 {
        u16::from_le_bytes([self.slice[0], self.slice[1]])
    }

    /// Reported azimuth in hundredths of a degree.
    ///
    /// Not wrapped: corrupt packets may report values at or above 36000.
    pub fn rotation(&self) -> u16 {
        u16::from_le_bytes([self.slice[2], self.slice[3]])
    }

    /// Raw distance of a channel slot in distance-resolution units.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= SCANS_PER_BLOCK`.
    #[inline]
    pub fn distance(&self, slot: usize) -> u16 {
        let k = BLOCK_HEADER_SIZE + slot * RAW_SCAN_SIZE;
        u16::from_le_bytes([self.slice[k], self.slice[k + 1]])
    }

    /// Raw intensity of a channel slot.
    #[inline]
    pub fn intensity(&self, slot: usize) -> u8 {
        self.slice[BLOCK_HEADER_SIZE + slot * RAW_SCAN_SIZE + 2]
    }

    /// The 100 raw block bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.slice
    }
}

/// Decoded view over one 1206-byte data packet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RawPacket<'a> {
    blocks: [RawBlock<'a>; BLOCKS_PER_PACKET],
    gps_timestamp: u32,
    return_mode_raw: u8,
    factory_id_raw: u8,
}

impl<'a> RawPacket<'a> {
    /// Decode a packet, failing unless `data` is exactly [`PACKET_SIZE`]
    /// bytes long.
    pub fn new(data: &'a [u8]) -> Result<RawPacket<'a>, Error> {
        if data.len() != PACKET_SIZE {
            return Err(Error::InvalidLength(data.len()));
        }

        let blocks = std::array::from_fn(|i| RawBlock {
            slice: &data[i * BLOCK_SIZE..(i + 1) * BLOCK_SIZE],
        });

        let gps_timestamp = u32::from_le_bytes([
            data[TIMESTAMP_OFFSET],
            data[TIMESTAMP_OFFSET + 1],
            data[TIMESTAMP_OFFSET + 2],
            data[TIMESTAMP_OFFSET + 3],
        ]);

        Ok(RawPacket {
            blocks,
            gps_timestamp,
            return_mode_raw: data[RETURN_MODE_OFFSET],
            factory_id_raw: data[FACTORY_ID_OFFSET],
        })
    }

    /// The twelve firing blocks in wire order.
    pub fn blocks(&self) -> &[RawBlock<'a>; BLOCKS_PER_PACKET] {
        &self.blocks
    }

    /// Microseconds since the most recent top of the hour.
    pub fn gps_timestamp(&self) -> u32 {
        self.gps_timestamp
    }

    pub fn return_mode_raw(&self) -> u8 {
        self.return_mode_raw
    }

    pub fn factory_id_raw(&self) -> u8 {
        self.factory_id_raw
    }

    /// Decoded return mode, `None` for unknown codes.
    pub fn return_mode(&self) -> Option<ReturnMode> {
        ReturnMode::from_byte(self.return_mode_raw)
    }

    /// Decoded factory id, `None` for reserved or future codes.
    pub fn factory_id(&self) -> Option<FactoryId> {
        FactoryId::from_byte(self.factory_id_raw)
    }

    /// Infer the hardware model from the factory-id byte.
    ///
    /// Returns `None` for unknown bytes and for ids that several models
    /// share.
    pub fn infer_model(&self) -> Option<Model> {
        self.factory_id().and_then(Model::from_factory_id)
    }

    /// Absolute packet time given the top of the hour the GPS timestamp is
    /// relative to.
    pub fn stamp(&self, top_of_hour: DateTime<Utc>) -> DateTime<Utc> {
        top_of_hour + TimeDelta::microseconds(self.gps_timestamp as i64)
    }

    /// Absolute packet time relative to the top of the hour read from
    /// `clock`.
    pub fn stamp_with<C: Clock>(&self, clock: &C) -> DateTime<Utc> {
        self.stamp(top_of_hour(clock.now()))
    }

    /// Absolute packet time relative to the top of the current hour.
    pub fn stamp_now(&self) -> DateTime<Utc> {
        self.stamp_with(&SystemClock)
    }
}

/// Wall clock source used when no top-of-hour reference is supplied.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Truncate a time to the start of its hour.
pub fn top_of_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    time.duration_trunc(TimeDelta::hours(1)).unwrap_or(time)
}
