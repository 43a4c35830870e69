// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common Velodyne types shared by the decoder, calibration and transform
//! stages.
//!
//! This module holds the crate [`Error`] type and the closed enumerations
//! describing the sensor: the hardware [`Model`], the packet [`ReturnMode`]
//! and the trailer [`FactoryId`].

use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;

/// Common error type for Velodyne decoding.
///
/// Only structural failures are errors. Unknown trailer codes and malformed
/// individual firings are reported through `Option` or skipped.
#[derive(Debug)]
pub enum Error {
    /// I/O error (file operations)
    Io(std::io::Error),
    /// Calibration description could not be parsed
    Json(serde_json::Error),
    /// Packet buffer is not exactly [`crate::packet::PACKET_SIZE`] bytes
    InvalidLength(usize),
    /// Invalid packet data
    InvalidPacket(String),
    /// Calibration description is inconsistent
    Calibration(String),
    /// No usable model for the requested operation
    UnsupportedModel(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "calibration parse error: {}", err),
            Error::InvalidLength(len) => write!(
                f,
                "invalid packet length: {} bytes, expected {}",
                len,
                crate::packet::PACKET_SIZE
            ),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
            Error::Calibration(msg) => write!(f, "calibration error: {}", msg),
            Error::UnsupportedModel(msg) => write!(f, "unsupported model: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

/// Velodyne hardware model.
///
/// Selected once per data source, either explicitly or inferred from a
/// packet's factory-id byte with [`Model::from_factory_id`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Deserialize)]
pub enum Model {
    /// VLP-16 (Puck)
    #[serde(rename = "VLP16")]
    Vlp16,
    /// VLP-16 Hi-Res
    #[serde(rename = "VLP16HiRes")]
    Vlp16HiRes,
    /// VLP-32C (Ultra Puck)
    #[serde(rename = "VLP32C")]
    Vlp32c,
    /// HDL-32E
    #[serde(rename = "HDL32E")]
    Hdl32e,
    /// HDL-64E
    #[serde(rename = "HDL64E")]
    Hdl64e,
    /// HDL-64E S2.1
    #[serde(rename = "HDL64E_S21")]
    Hdl64eS21,
    /// HDL-64E S3
    #[serde(rename = "HDL64E_S3")]
    Hdl64eS3,
    /// VLS-128 (Alpha Prime)
    #[serde(rename = "VLS128")]
    Vls128,
}

impl Model {
    /// Number of laser channels on the sensor.
    pub fn channels(&self) -> usize {
        match self {
            Model::Vlp16 | Model::Vlp16HiRes => 16,
            Model::Vlp32c | Model::Hdl32e => 32,
            Model::Hdl64e | Model::Hdl64eS21 | Model::Hdl64eS3 => 64,
            Model::Vls128 => 128,
        }
    }

    /// Factory distance resolution in meters per raw distance unit.
    pub fn distance_resolution(&self) -> f64 {
        match self {
            Model::Vls128 => 0.004,
            _ => 0.002,
        }
    }

    /// Map a decoded factory id to a model.
    ///
    /// Returns `None` when the id is shared by models that cannot be told
    /// apart from the trailer alone (VLP-32A/B, the HDL-64E revisions) or
    /// does not name a rotating sensor (Velarray).
    pub fn from_factory_id(id: FactoryId) -> Option<Model> {
        match id {
            FactoryId::Hdl32e => Some(Model::Hdl32e),
            FactoryId::Vlp16 => Some(Model::Vlp16),
            FactoryId::Vlp16HiRes => Some(Model::Vlp16HiRes),
            FactoryId::Vlp32c => Some(Model::Vlp32c),
            FactoryId::Vls128 | FactoryId::Vls128Old => Some(Model::Vls128),
            FactoryId::Vlp32ab | FactoryId::Velarray | FactoryId::Hdl64 => None,
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Model::Vlp16 => "VLP-16",
            Model::Vlp16HiRes => "VLP-16 Hi-Res",
            Model::Vlp32c => "VLP-32C",
            Model::Hdl32e => "HDL-32E",
            Model::Hdl64e => "HDL-64E",
            Model::Hdl64eS21 => "HDL-64E S2.1",
            Model::Hdl64eS3 => "HDL-64E S3",
            Model::Vls128 => "VLS-128",
        };
        write!(f, "{}", name)
    }
}

/// Capture return mode from the packet trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnMode {
    /// Strongest return only
    Strongest = 0x37,
    /// Last return only
    Last = 0x38,
    /// Strongest and last returns in alternating blocks
    Dual = 0x39,
}

impl ReturnMode {
    /// Decode a trailer byte, `None` for unknown codes.
    pub fn from_byte(value: u8) -> Option<ReturnMode> {
        match value {
            0x37 => Some(ReturnMode::Strongest),
            0x38 => Some(ReturnMode::Last),
            0x39 => Some(ReturnMode::Dual),
            _ => None,
        }
    }
}

/// Hardware factory id from the packet trailer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FactoryId {
    Hdl32e = 0x21,
    Vlp16 = 0x22,
    Vlp32ab = 0x23,
    Vlp16HiRes = 0x24,
    Vlp32c = 0x28,
    Velarray = 0x31,
    Vls128Old = 0x63,
    Hdl64 = 0xa0,
    Vls128 = 0xa1,
}

impl FactoryId {
    /// Decode a trailer byte, `None` for reserved or future codes.
    pub fn from_byte(value: u8) -> Option<FactoryId> {
        match value {
            0x21 => Some(FactoryId::Hdl32e),
            0x22 => Some(FactoryId::Vlp16),
            0x23 => Some(FactoryId::Vlp32ab),
            0x24 => Some(FactoryId::Vlp16HiRes),
            0x28 => Some(FactoryId::Vlp32c),
            0x31 => Some(FactoryId::Velarray),
            0x63 => Some(FactoryId::Vls128Old),
            0xa0 => Some(FactoryId::Hdl64),
            0xa1 => Some(FactoryId::Vls128),
            _ => None,
        }
    }
}
