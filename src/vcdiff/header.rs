// VCDIFF file header and per-window header (RFC 3284, Section 4).
//
// File header:
//   D6 C3 C4 <version>  Hdr_Indicator  [custom code table]
// where <version> is 0x00 for plain RFC 3284 and 'S' when any of the
// open-vcdiff format extensions (interleaved sections, window checksums)
// is in use.
//
// Window header:
//   Win_Indicator
//   [source segment length, source segment position]  if SOURCE or TARGET
//   length of the delta encoding
//     target window length
//     Delta_Indicator
//     data length, instructions length, addresses length
//     [Adler-32 checksum as a 63-bit varint]           if CHECKSUM
//     data section, instructions section, addresses section
//
// Parsing here is purely syntactic. Bounds against the dictionary and the
// decoder's limits are checked by the window decoder.

use bitflags::bitflags;

use super::decoder::DecodeError;
use super::varint;

// ---------------------------------------------------------------------------
// Magic and version
// ---------------------------------------------------------------------------

pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

/// Version byte of a standard RFC 3284 stream.
pub const VCDIFF_VERSION_STANDARD: u8 = 0x00;

/// Version byte of a stream using open-vcdiff format extensions.
pub const VCDIFF_VERSION_EXTENDED: u8 = b'S';

/// Magic plus version plus Hdr_Indicator.
pub const FILE_HEADER_SIZE: usize = 5;

// ---------------------------------------------------------------------------
// Indicator flags
// ---------------------------------------------------------------------------

bitflags! {
    /// Hdr_Indicator byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HdrIndicator: u8 {
        /// Secondary compression of sections (not supported).
        const SECONDARY = 1 << 0;
        /// A custom code table follows the header.
        const CODETABLE = 1 << 1;
    }
}

bitflags! {
    /// Win_Indicator byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WinIndicator: u8 {
        /// Source segment comes from the dictionary.
        const SOURCE = 1 << 0;
        /// Source segment comes from earlier target data.
        const TARGET = 1 << 1;
        /// An Adler-32 checksum of the target window follows the section
        /// lengths (open-vcdiff extension).
        const CHECKSUM = 1 << 2;
    }
}

bitflags! {
    /// Delta_Indicator byte. Any set bit means a secondary-compressed
    /// section, which is not supported.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 1 << 0;
        const INSTCOMP = 1 << 1;
        const ADDRCOMP = 1 << 2;
    }
}

bitflags! {
    /// Non-standard features an encoder may use.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FormatExtensions: u8 {
        /// Instructions, sizes, addresses and data share one section.
        const INTERLEAVED = 1 << 0;
        /// Each window carries an Adler-32 of its target bytes.
        const CHECKSUM = 1 << 1;
        /// Emit the JSON instruction listing instead of binary VCDIFF.
        const JSON = 1 << 2;
    }
}

impl FormatExtensions {
    /// Whether the binary stream needs the 'S' version byte.
    pub fn needs_extended_version(self) -> bool {
        self.intersects(Self::INTERLEAVED | Self::CHECKSUM)
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// The fixed five-byte prefix of a VCDIFF stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub indicator: HdrIndicator,
}

impl FileHeader {
    /// Whether the stream may use format extensions.
    pub fn is_extended(&self) -> bool {
        self.version == VCDIFF_VERSION_EXTENDED
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&VCDIFF_MAGIC);
        out.push(self.version);
        out.push(self.indicator.bits());
    }

    /// Parse and check the five-byte prefix. Custom code table data, if
    /// any, starts right after it.
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        // Reject a wrong magic as soon as the first bytes are in.
        let known = data.len().min(VCDIFF_MAGIC.len());
        if data[..known] != VCDIFF_MAGIC[..known] {
            return Err(DecodeError::InvalidInput(format!(
                "not a VCDIFF stream: bad magic {:02X?}",
                &data[..known]
            )));
        }
        if data.len() < FILE_HEADER_SIZE {
            return Err(DecodeError::EndOfData);
        }
        let version = data[3];
        if version != VCDIFF_VERSION_STANDARD && version != VCDIFF_VERSION_EXTENDED {
            return Err(DecodeError::Unsupported(format!(
                "VCDIFF version byte {version:#04X}"
            )));
        }
        let raw = data[4];
        let indicator = HdrIndicator::from_bits(raw).ok_or_else(|| {
            DecodeError::InvalidInput(format!("unrecognized Hdr_Indicator bits {raw:#04X}"))
        })?;
        if indicator.contains(HdrIndicator::SECONDARY) {
            return Err(DecodeError::Unsupported(
                "secondary compression (VCD_DECOMPRESS) is not supported".into(),
            ));
        }
        Ok(Self { version, indicator })
    }
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// A parsed window header. Lengths are non-negative 31-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowHeader {
    pub indicator: WinIndicator,
    pub source_segment_length: i32,
    pub source_segment_position: i32,
    pub delta_encoding_length: i32,
    pub target_window_length: i32,
    pub delta_indicator: DeltaIndicator,
    pub data_length: i32,
    pub instructions_length: i32,
    pub addresses_length: i32,
    pub checksum: Option<u32>,
}

impl WindowHeader {
    /// Build a header for the given sections, computing the delta encoding
    /// length.
    pub fn for_sections(
        indicator: WinIndicator,
        source_segment_length: i32,
        target_window_length: i32,
        data_length: i32,
        instructions_length: i32,
        addresses_length: i32,
        checksum: Option<u32>,
    ) -> Self {
        let mut indicator = indicator;
        indicator.set(WinIndicator::CHECKSUM, checksum.is_some());
        let mut header = Self {
            indicator,
            source_segment_length,
            source_segment_position: 0,
            delta_encoding_length: 0,
            target_window_length,
            delta_indicator: DeltaIndicator::empty(),
            data_length,
            instructions_length,
            addresses_length,
            checksum,
        };
        header.delta_encoding_length = header.compute_delta_encoding_length();
        header
    }

    #[inline]
    pub fn has_source_segment(&self) -> bool {
        self.indicator
            .intersects(WinIndicator::SOURCE | WinIndicator::TARGET)
    }

    /// Bytes covered by "length of the delta encoding": the rest of the
    /// header after that field plus all three sections.
    pub fn compute_delta_encoding_length(&self) -> i32 {
        let mut len = varint::encoded_len_i32(self.target_window_length)
            + 1
            + varint::encoded_len_i32(self.data_length)
            + varint::encoded_len_i32(self.instructions_length)
            + varint::encoded_len_i32(self.addresses_length);
        if let Some(sum) = self.checksum {
            len += varint::encoded_len_i64(sum as i64);
        }
        len as i32 + self.data_length + self.instructions_length + self.addresses_length
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.indicator.bits());
        if self.has_source_segment() {
            varint::write_i32(out, self.source_segment_length);
            varint::write_i32(out, self.source_segment_position);
        }
        varint::write_i32(out, self.delta_encoding_length);
        varint::write_i32(out, self.target_window_length);
        out.push(self.delta_indicator.bits());
        varint::write_i32(out, self.data_length);
        varint::write_i32(out, self.instructions_length);
        varint::write_i32(out, self.addresses_length);
        if let Some(sum) = self.checksum {
            varint::write_i64(out, sum as i64);
        }
    }

    /// Parse a window header from the front of `data`, returning it and the
    /// number of header bytes consumed (the sections start there).
    ///
    /// Truncation anywhere is `EndOfData`. Structural problems (both SOURCE
    /// and TARGET, unknown bits, compressed sections, length mismatch) are
    /// `InvalidInput` or `Unsupported`.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), DecodeError> {
        let mut pos = 0;
        let raw = *data.first().ok_or(DecodeError::EndOfData)?;
        pos += 1;
        let indicator = WinIndicator::from_bits(raw).ok_or_else(|| {
            DecodeError::InvalidInput(format!("unrecognized Win_Indicator bits {raw:#04X}"))
        })?;
        if indicator.contains(WinIndicator::SOURCE | WinIndicator::TARGET) {
            return Err(DecodeError::InvalidInput(
                "Win_Indicator has both VCD_SOURCE and VCD_TARGET set".into(),
            ));
        }

        let mut header = Self {
            indicator,
            ..Self::default()
        };
        if header.has_source_segment() {
            header.source_segment_length = varint::read_i32(data, &mut pos)?;
            header.source_segment_position = varint::read_i32(data, &mut pos)?;
        }

        header.delta_encoding_length = varint::read_i32(data, &mut pos)?;
        let delta_encoding_start = pos;
        header.target_window_length = varint::read_i32(data, &mut pos)?;

        let raw = *data.get(pos).ok_or(DecodeError::EndOfData)?;
        pos += 1;
        header.delta_indicator = DeltaIndicator::from_bits_retain(raw);
        if header.delta_indicator.intersects(DeltaIndicator::all()) {
            return Err(DecodeError::Unsupported(format!(
                "secondary compression of sections (Delta_Indicator {raw:#04X})"
            )));
        }
        if !header.delta_indicator.is_empty() {
            return Err(DecodeError::InvalidInput(format!(
                "unrecognized Delta_Indicator bits {raw:#04X}"
            )));
        }

        header.data_length = varint::read_i32(data, &mut pos)?;
        header.instructions_length = varint::read_i32(data, &mut pos)?;
        header.addresses_length = varint::read_i32(data, &mut pos)?;

        if indicator.contains(WinIndicator::CHECKSUM) {
            let sum = varint::read_i64(data, &mut pos)?;
            let sum = u32::try_from(sum).map_err(|_| {
                DecodeError::InvalidInput(format!("checksum {sum} does not fit in 32 bits"))
            })?;
            header.checksum = Some(sum);
        }

        let header_part = (pos - delta_encoding_start) as i64;
        let declared = header.delta_encoding_length as i64;
        let computed = header_part
            + header.data_length as i64
            + header.instructions_length as i64
            + header.addresses_length as i64;
        if declared != computed {
            return Err(DecodeError::InvalidInput(format!(
                "delta encoding length {declared} does not match header and sections ({computed})"
            )));
        }
        Ok((header, pos))
    }

    /// Total bytes of the window: header plus sections.
    pub fn window_size(&self, header_len: usize) -> usize {
        header_len
            + self.data_length as usize
            + self.instructions_length as usize
            + self.addresses_length as usize
    }
}

impl From<varint::VarintError> for DecodeError {
    fn from(e: varint::VarintError) -> Self {
        match e {
            varint::VarintError::EndOfData => DecodeError::EndOfData,
            varint::VarintError::Overflow => {
                DecodeError::InvalidInput("variable-length integer overflow".into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WindowHeader {
        WindowHeader::for_sections(WinIndicator::SOURCE, 100, 50, 10, 5, 3, None)
    }

    #[test]
    fn file_header_roundtrip() {
        let h = FileHeader {
            version: VCDIFF_VERSION_EXTENDED,
            indicator: HdrIndicator::CODETABLE,
        };
        let mut out = Vec::new();
        h.encode(&mut out);
        assert_eq!(out, vec![0xD6, 0xC3, 0xC4, b'S', 0x02]);
        assert_eq!(FileHeader::parse(&out).unwrap(), h);
        assert!(h.is_extended());
    }

    #[test]
    fn file_header_errors() {
        assert!(matches!(FileHeader::parse(&[]), Err(DecodeError::EndOfData)));
        assert!(matches!(
            FileHeader::parse(&[0xD6, 0xC3]),
            Err(DecodeError::EndOfData)
        ));
        assert!(matches!(
            FileHeader::parse(&[0xD6, 0x00]),
            Err(DecodeError::InvalidInput(_))
        ));
        assert!(matches!(
            FileHeader::parse(&[0xD6, 0xC3, 0xC4, 0x01, 0x00]),
            Err(DecodeError::Unsupported(_))
        ));
        assert!(matches!(
            FileHeader::parse(&[0xD6, 0xC3, 0xC4, 0x00, 0x01]),
            Err(DecodeError::Unsupported(_))
        ));
        assert!(matches!(
            FileHeader::parse(&[0xD6, 0xC3, 0xC4, 0x00, 0x08]),
            Err(DecodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn window_header_roundtrip() {
        let h = sample();
        let mut out = Vec::new();
        h.encode(&mut out);
        let (parsed, len) = WindowHeader::parse(&out).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(len, out.len());
        assert_eq!(parsed.window_size(len), out.len() + 18);
    }

    #[test]
    fn delta_encoding_length_counts_checksum() {
        let plain = sample();
        let with_sum =
            WindowHeader::for_sections(WinIndicator::SOURCE, 100, 50, 10, 5, 3, Some(0xFFFF_FFFF));
        assert!(with_sum.indicator.contains(WinIndicator::CHECKSUM));
        assert_eq!(
            with_sum.delta_encoding_length - plain.delta_encoding_length,
            varint::encoded_len_i64(0xFFFF_FFFF) as i32
        );
        let mut out = Vec::new();
        with_sum.encode(&mut out);
        let (parsed, _) = WindowHeader::parse(&out).unwrap();
        assert_eq!(parsed.checksum, Some(0xFFFF_FFFF));
    }

    #[test]
    fn truncated_window_header_is_end_of_data() {
        let mut out = Vec::new();
        sample().encode(&mut out);
        for cut in 0..out.len() {
            assert!(
                matches!(WindowHeader::parse(&out[..cut]), Err(DecodeError::EndOfData)),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let mut h = sample();
        h.delta_encoding_length += 1;
        let mut out = Vec::new();
        h.encode(&mut out);
        assert!(matches!(
            WindowHeader::parse(&out),
            Err(DecodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn source_and_target_together_is_an_error() {
        assert!(matches!(
            WindowHeader::parse(&[0x03, 0, 0]),
            Err(DecodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn compressed_sections_are_unsupported() {
        let mut h = sample();
        h.delta_indicator = DeltaIndicator::INSTCOMP;
        let mut out = Vec::new();
        h.encode(&mut out);
        assert!(matches!(
            WindowHeader::parse(&out),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn unknown_delta_indicator_bits_are_invalid() {
        let mut out = Vec::new();
        sample().encode(&mut out);
        let at = out.len() - 4;
        assert_eq!(out[at], 0);
        out[at] = 0x10;
        assert!(matches!(
            WindowHeader::parse(&out),
            Err(DecodeError::InvalidInput(_))
        ));
        out[at] = 0x11;
        assert!(matches!(
            WindowHeader::parse(&out),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn extension_flags() {
        assert!(!FormatExtensions::empty().needs_extended_version());
        assert!(!FormatExtensions::JSON.needs_extended_version());
        assert!(FormatExtensions::CHECKSUM.needs_extended_version());
        assert!(FormatExtensions::INTERLEAVED.needs_extended_version());
    }
}
