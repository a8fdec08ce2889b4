//! The metadata root (ECMA-335 II.24.2.1) and its stream headers.
//!
//! The root starts with the `BSJB` signature, a version string padded to a multiple of
//! four bytes, and a list of stream headers. Each header gives the offset (from the start
//! of the root) and size of one stream, followed by its NUL-terminated name, again padded
//! to four bytes.

use crate::{
    file::{
        io::{align_to, push_le},
        parser::Parser,
    },
    Result,
};

/// The `BSJB` signature
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// Default runtime version string
pub const DEFAULT_VERSION: &str = "v4.0.30319";

/// Location and name of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Offset from the start of the metadata root
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
    /// Stream name, e.g. `#~`
    pub name: String,
}

/// A parsed metadata root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    /// Major version, 1
    pub major_version: u16,
    /// Minor version, 1
    pub minor_version: u16,
    /// Runtime version string without padding
    pub version: String,
    /// Reserved flags
    pub flags: u16,
    /// Stream headers in file order
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse a metadata root.
    ///
    /// # Errors
    /// Returns an error for a wrong signature or a stream that lies outside of `data`
    pub fn read(data: &[u8]) -> Result<Root> {
        let mut parser = Parser::new(data);
        let signature = parser.read_le::<u32>()?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - 0x{:08x}",
                signature
            ));
        }

        let major_version = parser.read_le::<u16>()?;
        let minor_version = parser.read_le::<u16>()?;
        parser.advance_by(4)?;

        let version_length = parser.read_le::<u32>()? as usize;
        let version_bytes = parser.read_bytes(version_length)?;
        let version_end = version_bytes
            .iter()
            .position(|byte| *byte == 0)
            .unwrap_or(version_bytes.len());
        let version = String::from_utf8(version_bytes[..version_end].to_vec())
            .map_err(|e| malformed_error!("Invalid metadata version string: {}", e))?;

        let flags = parser.read_le::<u16>()?;
        let stream_count = parser.read_le::<u16>()?;
        if stream_count == 0 {
            return Err(malformed_error!("Metadata root declares no streams"));
        }

        let mut stream_headers = Vec::with_capacity(usize::from(stream_count));
        for _ in 0..stream_count {
            let offset = parser.read_le::<u32>()?;
            let size = parser.read_le::<u32>()?;
            let name = parser.read_string_utf8()?;
            parser.align(4)?;

            match offset.checked_add(size) {
                Some(end) if end as usize <= data.len() => {}
                _ => {
                    return Err(malformed_error!(
                        "Stream {} at {}+{} lies outside of the {} byte metadata root",
                        name,
                        offset,
                        size,
                        data.len()
                    ))
                }
            }
            if stream_headers
                .iter()
                .any(|header: &StreamHeader| header.name == name)
            {
                return Err(malformed_error!("Duplicate stream {}", name));
            }

            stream_headers.push(StreamHeader { offset, size, name });
        }

        Ok(Root {
            major_version,
            minor_version,
            version,
            flags,
            stream_headers,
        })
    }

    /// The header of the stream with one of the given names
    #[must_use]
    pub fn stream(&self, names: &[&str]) -> Option<&StreamHeader> {
        self.stream_headers
            .iter()
            .find(|header| names.contains(&header.name.as_str()))
    }

    /// The bytes of the stream with one of the given names
    #[must_use]
    pub fn stream_data<'a>(&self, data: &'a [u8], names: &[&str]) -> Option<&'a [u8]> {
        self.stream(names).map(|header| {
            &data[header.offset as usize..header.offset as usize + header.size as usize]
        })
    }

    /// Assemble a metadata root from named streams; every stream is padded to 4 bytes.
    ///
    /// # Errors
    /// Returns an error if the version string or a stream is too large
    pub fn write(version: &str, streams: &[(&str, Vec<u8>)]) -> Result<Vec<u8>> {
        let mut version_bytes = version.as_bytes().to_vec();
        version_bytes.push(0);
        align_to(&mut version_bytes, 4);
        if version_bytes.len() > 255 {
            return Err(malformed_error!("Version string {} is too long", version));
        }

        let header_size = 20
            + version_bytes.len()
            + streams
                .iter()
                .map(|(name, _)| 8 + ((name.len() + 1 + 3) & !3))
                .sum::<usize>();

        let mut out = Vec::new();
        push_le(&mut out, CIL_HEADER_MAGIC);
        push_le(&mut out, 1_u16);
        push_le(&mut out, 1_u16);
        push_le(&mut out, 0_u32);
        push_le(&mut out, version_bytes.len() as u32);
        out.extend_from_slice(&version_bytes);
        push_le(&mut out, 0_u16);
        push_le(
            &mut out,
            u16::try_from(streams.len()).map_err(|_| malformed_error!("Too many streams"))?,
        );

        let mut offset = header_size;
        for (name, content) in streams {
            let size = (content.len() + 3) & !3;
            push_le(
                &mut out,
                u32::try_from(offset).map_err(|_| malformed_error!("Metadata too large"))?,
            );
            push_le(
                &mut out,
                u32::try_from(size).map_err(|_| malformed_error!("Stream {} too large", name))?,
            );
            out.extend_from_slice(name.as_bytes());
            out.push(0);
            align_to(&mut out, 4);
            offset += size;
        }

        for (_, content) in streams {
            out.extend_from_slice(content);
            align_to(&mut out, 4);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x42, 0x53, 0x4A, 0x42,
            0x01, 0x00,
            0x01, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x08, 0x00, 0x00, 0x00,
            b'v', b'4', b'.', b'0', 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
            0x01, 0x00,

            0x28, 0x00, 0x00, 0x00,
            0x04, 0x00, 0x00, 0x00,
            0x23, 0x7E, 0x00, 0x00,

            0xAA, 0xBB, 0xCC, 0xDD,
        ];

        let root = Root::read(&header_bytes).unwrap();
        assert_eq!(root.version, "v4.0");
        assert_eq!(root.stream_headers.len(), 1);
        assert_eq!(root.stream_headers[0].name, "#~");
        assert_eq!(
            root.stream_data(&header_bytes, &["#~", "#-"]),
            Some(&[0xAA, 0xBB, 0xCC, 0xDD][..])
        );
    }

    #[test]
    fn write_then_read() {
        let streams = [
            ("#~", vec![1, 2, 3, 4, 5]),
            ("#Strings", vec![0]),
            ("#GUID", Vec::new()),
        ];
        let bytes = Root::write(DEFAULT_VERSION, &streams).unwrap();
        let root = Root::read(&bytes).unwrap();

        assert_eq!(root.version, DEFAULT_VERSION);
        assert_eq!(root.stream_headers[0].size, 8);
        assert_eq!(
            &root.stream_data(&bytes, &["#~"]).unwrap()[..5],
            &[1, 2, 3, 4, 5]
        );
        assert_eq!(root.stream_data(&bytes, &["#Strings"]).unwrap(), &[0, 0, 0, 0]);
        assert_eq!(root.stream(&["#GUID"]).unwrap().size, 0);
    }

    #[test]
    fn rejects_bad_roots() {
        assert!(Root::read(&[0x00, 0x00, 0x00, 0x00]).is_err());

        let mut bytes = Root::write("v1", &[("#~", vec![0; 4])]).unwrap();
        let size_offset = 20 + 4 + 4;
        bytes[size_offset] = 0xFF;
        assert!(Root::read(&bytes).is_err());
    }
}
