use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Fixed framing header preceding every message on a SPICE channel. 18
/// bytes, little-endian, no padding.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SpiceDataHeader {
    pub serial: u64,
    pub msg_type: u16,
    pub size: u32,
    pub sub_list: u32,
}

impl SpiceDataHeader {
    pub const SIZE: usize = 18;

    #[inline]
    pub fn read<R: Read>(mut stream: R) -> io::Result<SpiceDataHeader> {
        let serial = stream.read_u64::<LittleEndian>()?;
        let msg_type = stream.read_u16::<LittleEndian>()?;
        let size = stream.read_u32::<LittleEndian>()?;
        let sub_list = stream.read_u32::<LittleEndian>()?;

        Ok(SpiceDataHeader {
            serial,
            msg_type,
            size,
            sub_list,
        })
    }

    #[inline]
    pub fn write<W: Write>(&self, mut stream: W) -> io::Result<()> {
        stream.write_u64::<LittleEndian>(self.serial)?;
        stream.write_u16::<LittleEndian>(self.msg_type)?;
        stream.write_u32::<LittleEndian>(self.size)?;
        stream.write_u32::<LittleEndian>(self.sub_list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let header = SpiceDataHeader {
            serial: 42,
            msg_type: 7,
            size: 128,
            sub_list: 0,
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), SpiceDataHeader::SIZE);

        let parsed = SpiceDataHeader::read(&buf[..]).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn little_endian_byte_layout() {
        let header = SpiceDataHeader {
            serial: 1,
            msg_type: 0x0102,
            size: 0x0304_0506,
            sub_list: 0,
        };

        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();

        assert_eq!(&buf[8..10], &[0x02, 0x01]);
        assert_eq!(&buf[10..14], &[0x06, 0x05, 0x04, 0x03]);
    }
}
