// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! PCAP capture reader for offline replay of Velodyne recordings.
//!
//! [`PcapSource`] loads a PCAP or PCAPNG capture, extracts the UDP payloads
//! (optionally only those on one port) together with their capture time, and
//! hands them out in capture order.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_velodyne::pcap_source::{PcapSource, VELODYNE_DATA_PORT};
//!
//! let mut source = PcapSource::from_file("capture.pcap", Some(VELODYNE_DATA_PORT))?;
//! while let Some(captured) = source.next_packet() {
//!     let packet = RawPacket::new(&captured.payload)?;
//!     // ...
//! }
//! ```

use crate::lidar::Error;
use chrono::{DateTime, Utc};
use pcap_parser::traits::PcapReaderIterator;
use std::path::Path;
use tracing::warn;

/// Default UDP port of Velodyne data packets
pub const VELODYNE_DATA_PORT: u16 = 2368;

/// PCAPNG interface resolution when `if_tsresol` is absent (microseconds)
const DEFAULT_TS_RESOLUTION: u64 = 1_000_000;

/// One UDP payload read from a capture.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedPacket {
    pub payload: Vec<u8>,
    /// Capture time, `None` for PCAPNG simple packet blocks
    pub timestamp: Option<DateTime<Utc>>,
}

/// Capture file packet source for offline replay.
///
/// Loads the entire file into memory. Supports both legacy PCAP and PCAPNG.
pub struct PcapSource {
    packets: Vec<CapturedPacket>,
    index: usize,
}

impl PcapSource {
    /// Load a capture from disk, optionally keeping only UDP datagrams whose
    /// source or destination port is `port`.
    pub fn from_file<P: AsRef<Path>>(path: P, port: Option<u16>) -> Result<Self, Error> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(&data, port)
    }

    /// Load a capture from its raw file contents.
    pub fn from_bytes(data: &[u8], port: Option<u16>) -> Result<Self, Error> {
        let mut packets = Vec::new();

        // PCAPNG starts with the Section Header Block magic
        if data.len() >= 4 && data[0..4] == [0x0a, 0x0d, 0x0d, 0x0a] {
            Self::extract_pcapng(data, port, &mut packets)?;
        } else {
            Self::extract_legacy_pcap(data, port, &mut packets)?;
        }

        Ok(Self { packets, index: 0 })
    }

    fn extract_legacy_pcap(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<CapturedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        // Buffer must hold the whole file to avoid Incomplete errors
        let mut reader = LegacyPcapReader::new(data.len(), data)
            .map_err(|e| Error::InvalidPacket(format!("failed to create PCAP reader: {:?}", e)))?;

        // The header magic selects microsecond or nanosecond fractions
        let mut nanosecond = false;

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            nanosecond = header.is_nanosecond_precision();
                        }
                        PcapBlockOwned::Legacy(packet) => {
                            let nanos = if nanosecond {
                                packet.ts_usec
                            } else {
                                packet.ts_usec.saturating_mul(1000)
                            };
                            let timestamp = DateTime::from_timestamp(packet.ts_sec as i64, nanos);
                            if let Some(payload) = Self::extract_udp_payload(packet.data, port) {
                                packets.push(CapturedPacket { payload, timestamp });
                            }
                        }
                        _ => {}
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                // Everything is loaded, a truncated trailing record is dropped
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAP parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    fn extract_pcapng(
        data: &[u8],
        port: Option<u16>,
        packets: &mut Vec<CapturedPacket>,
    ) -> Result<(), Error> {
        use pcap_parser::*;

        let mut reader = PcapNGReader::new(data.len(), data).map_err(|e| {
            Error::InvalidPacket(format!("failed to create PCAPNG reader: {:?}", e))
        })?;

        // (units per second, offset in seconds) of each interface in the
        // current section, `None` for an unusable if_tsresol
        let mut interfaces: Vec<Option<(u64, i64)>> = Vec::new();

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    match block {
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => interfaces.clear(),
                        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                            let clock = idb.ts_resolution().map(|units| (units, idb.ts_offset()));
                            if clock.is_none() {
                                warn!(
                                    "interface {} has unsupported if_tsresol {:#04x}",
                                    interfaces.len(),
                                    idb.if_tsresol
                                );
                            }
                            interfaces.push(clock);
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                            let ts = ((epb.ts_high as u64) << 32) | epb.ts_low as u64;
                            let timestamp = interfaces
                                .get(epb.if_id as usize)
                                .copied()
                                .unwrap_or(Some((DEFAULT_TS_RESOLUTION, 0)))
                                .and_then(|(units, ts_offset)| {
                                    pcapng_timestamp(ts, units, ts_offset)
                                });
                            if let Some(payload) = Self::extract_udp_payload(epb.data, port) {
                                packets.push(CapturedPacket { payload, timestamp });
                            }
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                            if let Some(payload) = Self::extract_udp_payload(spb.data, port) {
                                packets.push(CapturedPacket {
                                    payload,
                                    timestamp: None,
                                });
                            }
                        }
                        _ => {}
                    }
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => break,
                Err(e) => {
                    return Err(Error::InvalidPacket(format!("PCAPNG parse error: {:?}", e)));
                }
            }
        }

        Ok(())
    }

    /// UDP payload of an Ethernet frame, `None` for non-UDP or filtered
    /// frames and empty datagrams.
    fn extract_udp_payload(data: &[u8], port: Option<u16>) -> Option<Vec<u8>> {
        use etherparse::{SlicedPacket, TransportSlice};

        let packet = SlicedPacket::from_ethernet(data).ok()?;
        let Some(TransportSlice::Udp(udp)) = packet.transport else {
            return None;
        };

        if let Some(filter_port) = port {
            if udp.source_port() != filter_port && udp.destination_port() != filter_port {
                return None;
            }
        }

        let payload = udp.payload();
        if payload.is_empty() {
            return None;
        }
        Some(payload.to_vec())
    }

    /// Next packet in capture order, `None` once exhausted.
    pub fn next_packet(&mut self) -> Option<&CapturedPacket> {
        let packet = self.packets.get(self.index)?;
        self.index += 1;
        Some(packet)
    }

    /// All extracted packets.
    pub fn packets(&self) -> &[CapturedPacket] {
        &self.packets
    }

    /// Rewind to the first packet.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.index < self.packets.len()
    }

    pub fn remaining(&self) -> usize {
        self.packets.len().saturating_sub(self.index)
    }
}

/// Capture time of a PCAPNG timestamp counted in `units` per second, shifted
/// by the interface offset in seconds.
fn pcapng_timestamp(ts: u64, units: u64, offset: i64) -> Option<DateTime<Utc>> {
    if units == 0 {
        return None;
    }
    let secs = i64::try_from(ts / units).ok()?.checked_add(offset)?;
    let nanos = (ts % units) as u128 * 1_000_000_000 / units as u128;
    DateTime::from_timestamp(secs, nanos as u32)
}
