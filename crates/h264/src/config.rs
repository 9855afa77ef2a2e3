use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use bytes_util::{BytesCursor, BytesCursorExt, BytesWriter};

use crate::nalu::{NaluReformatter, SHORT_START_CODE, START_CODE};

/// The AVC (H.264) Decoder Configuration Record.
/// ISO/IEC 14496-15:2022(E) - 5.3.2.1.2
///
/// Only the fields an Annex-B consumer needs are kept; the optional
/// high-profile extension that may trail the PPS list is ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct AvcConfig {
    /// Always 1 for records written to date.
    pub configuration_version: u8,

    /// AVCProfileIndication, the `profile_idc` of the SPS.
    pub profile: u8,

    /// The constraint flags byte that sits between profile and level in the SPS.
    pub profile_compatibility: u8,

    /// AVCLevelIndication, the `level_idc` of the SPS.
    pub level: u8,

    /// Width in bytes of the length prefix in front of every NAL unit, 1 to 4.
    pub nal_length_size: u8,

    /// Sequence parameter sets, in ascending id order.
    pub sps: Vec<Bytes>,

    /// Picture parameter sets, in ascending id order.
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parses a record from the payload of an AVC sequence-header packet.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if any declared parameter
    /// set runs past the end of the record.
    pub fn parse(reader: &mut BytesCursor) -> io::Result<Self> {
        let configuration_version = reader.read_u8()?;
        let profile = reader.read_u8()?;
        let profile_compatibility = reader.read_u8()?;
        let level = reader.read_u8()?;
        let nal_length_size = (reader.read_u8()? & 0b0000_0011) + 1;

        let sps_count = reader.read_u8()? & 0b0001_1111;
        let mut sps = Vec::with_capacity(sps_count as usize);
        for _ in 0..sps_count {
            let len = reader.read_u16::<BigEndian>()?;
            sps.push(reader.extract_bytes(len as usize)?);
        }

        let pps_count = reader.read_u8()?;
        let mut pps = Vec::with_capacity(pps_count as usize);
        for _ in 0..pps_count {
            let len = reader.read_u16::<BigEndian>()?;
            pps.push(reader.extract_bytes(len as usize)?);
        }

        Ok(Self {
            configuration_version,
            profile,
            profile_compatibility,
            level,
            nal_length_size,
            sps,
            pps,
        })
    }

    /// Encoded size of the record in bytes.
    pub fn size(&self) -> usize {
        6 // version, profile, compatibility, level, length size, sps count
        + self.sps.iter().map(|sps| 2 + sps.len()).sum::<usize>()
        + 1 // pps count
        + self.pps.iter().map(|pps| 2 + pps.len()).sum::<usize>()
    }

    /// Writes the record with all reserved bits set, as muxers do.
    pub fn build<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        if !(1..=4).contains(&self.nal_length_size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("NAL length size {} out of range", self.nal_length_size),
            ));
        }
        if self.sps.len() > 0x1F || self.pps.len() > 0xFF {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "too many parameter sets",
            ));
        }

        writer.write_u8(self.configuration_version)?;
        writer.write_u8(self.profile)?;
        writer.write_u8(self.profile_compatibility)?;
        writer.write_u8(self.level)?;
        writer.write_u8(0b1111_1100 | (self.nal_length_size - 1))?;

        writer.write_u8(0b1110_0000 | self.sps.len() as u8)?;
        for sps in &self.sps {
            writer.write_u16::<BigEndian>(parameter_set_len(sps)?)?;
            writer.write_all(sps)?;
        }

        writer.write_u8(self.pps.len() as u8)?;
        for pps in &self.pps {
            writer.write_u16::<BigEndian>(parameter_set_len(pps)?)?;
            writer.write_all(pps)?;
        }

        Ok(())
    }

    /// Annex-B start code matching the NAL length size: 3 bytes below 4, else 4.
    pub fn start_code(&self) -> &'static [u8] {
        if self.nal_length_size < 4 {
            &SHORT_START_CODE
        } else {
            &START_CODE
        }
    }

    /// First SPS and first PPS, each behind a start code.
    ///
    /// This is the out-of-band configuration buffer a decoder expects ahead of
    /// the first coded picture. `None` when either list is empty.
    pub fn code_private_data(&self) -> Option<Bytes> {
        let (sps, pps) = (self.sps.first()?, self.pps.first()?);
        let start_code = self.start_code();

        let mut writer = BytesWriter::with_capacity(2 * start_code.len() + sps.len() + pps.len());
        writer
            .write_bytes(start_code)
            .write_bytes(sps)
            .write_bytes(start_code)
            .write_bytes(pps);
        Some(writer.freeze())
    }

    /// First SPS and first PPS, each behind a 16-bit big-endian length.
    ///
    /// This is the sequence-header blob carried in stream descriptors.
    pub fn sequence_header(&self) -> Option<Bytes> {
        let (sps, pps) = (self.sps.first()?, self.pps.first()?);

        let mut writer = BytesWriter::with_capacity(4 + sps.len() + pps.len());
        writer
            .write_u16(sps.len() as u16)
            .write_bytes(sps)
            .write_u16(pps.len() as u16)
            .write_bytes(pps);
        Some(writer.freeze())
    }

    /// A reformatter for NAL units framed with this record's length size.
    pub fn reformatter(&self) -> NaluReformatter {
        NaluReformatter::new(self.nal_length_size)
    }
}

fn parameter_set_len(set: &Bytes) -> io::Result<u16> {
    u16::try_from(set.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "parameter set too large"))
}
