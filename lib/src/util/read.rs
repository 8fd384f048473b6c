use std::{io, io::Read};

use zerocopy::{AsBytes, FromBytes, FromZeroes};

#[inline(always)]
pub fn read_from<T, R>(reader: &mut R) -> io::Result<T>
where
    T: FromBytes + FromZeroes + AsBytes,
    R: Read + ?Sized,
{
    let mut ret = <T>::new_zeroed();
    reader.read_exact(ret.as_bytes_mut())?;
    Ok(ret)
}

#[inline(always)]
pub fn read_vec<T, R>(reader: &mut R, count: usize) -> io::Result<Vec<T>>
where
    T: FromBytes + FromZeroes + AsBytes,
    R: Read + ?Sized,
{
    let mut ret = <T>::new_vec_zeroed(count);
    reader.read_exact(ret.as_mut_slice().as_bytes_mut())?;
    Ok(ret)
}
