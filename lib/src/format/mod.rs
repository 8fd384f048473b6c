pub mod chunk;
pub mod cmdl;
pub mod error;
pub mod foot;
pub mod form;
pub mod handler;
pub mod registry;
pub mod rfrm;
pub mod txtr;

use std::fmt::{Debug, Display, Formatter, Write};

use binrw::{binrw, Endian};
use serde::{Serialize, Serializer};
use uuid::Uuid;
use zerocopy::{AsBytes, ByteOrder, FromBytes, FromZeroes};

use crate::array_ref;

#[binrw]
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default, FromBytes, FromZeroes, AsBytes)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    #[inline]
    pub fn from_u32(value: u32) -> Self { Self(value.to_be_bytes()) }

    #[inline]
    pub fn as_u32(&self) -> u32 { u32::from_be_bytes(self.0) }
}

impl Display for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for c in self.0 {
            f.write_char(c as char)?;
        }
        Ok(())
    }
}

impl Debug for FourCC {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_char('"')?;
        for c in self.0 {
            f.write_char(c as char)?;
        }
        f.write_char('"')?;
        Ok(())
    }
}

impl PartialEq<[u8; 4]> for FourCC {
    fn eq(&self, other: &[u8; 4]) -> bool { &self.0 == other }
}

impl TryFrom<&str> for FourCC {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes: [u8; 4] = value
            .as_bytes()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Type code must be exactly 4 bytes: {value:?}"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Pairs a zerocopy byte order with the matching binrw endianness.
pub trait ByteOrderExt: ByteOrder {
    const ENDIAN: Endian;
}

impl ByteOrderExt for zerocopy::BigEndian {
    const ENDIAN: Endian = Endian::Big;
}

impl ByteOrderExt for zerocopy::LittleEndian {
    const ENDIAN: Endian = Endian::Little;
}

#[inline]
pub fn peek_four_cc(data: &[u8]) -> FourCC { FourCC(*array_ref!(data, 0, 4)) }

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CVector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CColor4f {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[binrw]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CAABox {
    pub min: CVector3f,
    pub max: CVector3f,
}

/// 128-bit asset identifier.
///
/// The trailing 8 bytes are kept in storage order. When displayed they are
/// reversed, which is how the games' own tooling prints these IDs.
#[binrw]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CAssetId {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl CAssetId {
    pub fn to_uuid(&self) -> Uuid {
        let mut data4 = self.data4;
        data4.reverse();
        Uuid::from_fields(self.data1, self.data2, self.data3, &data4)
    }

    #[inline]
    pub fn is_null(&self) -> bool { *self == Self::default() }
}

impl Display for CAssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.to_uuid()) }
}

impl Serialize for CAssetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct CObjectTag {
    pub kind: FourCC,
    pub id: CAssetId,
}

#[binrw]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SAssetHeader {
    pub type_id: u16,
    pub version: u16,
}
