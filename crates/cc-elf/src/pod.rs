//! Tools for converting file format structures to and from bytes.
//!
//! Every on-disk record is `#[repr(C)]`, has no padding, and is
//! little-endian (this toolchain only ever targets ELF64 LSB), so this
//! crate never needs a runtime endian parameter.

use std::mem;

/// A type that can be safely reinterpreted as bytes and back.
///
/// # Safety
/// Implementors must be `#[repr(C)]` or `#[repr(transparent)]`, contain no
/// padding, and have no invalid bit patterns.
pub unsafe trait Pod: Copy + 'static {}

/// Casts `val` to its raw byte representation.
pub fn bytes_of<T: Pod>(val: &T) -> &[u8] {
    let size = mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts(val as *const T as *const u8, size) }
}

/// Casts a `Pod` slice to its raw byte representation.
pub fn bytes_of_slice<T: Pod>(val: &[T]) -> &[u8] {
    let size = mem::size_of_val(val);
    unsafe { std::slice::from_raw_parts(val.as_ptr() as *const u8, size) }
}

/// Reads a `T` from the front of `data`, returning it and the remaining tail.
pub fn from_bytes<T: Pod>(data: &[u8]) -> Option<(T, &[u8])> {
    let size = mem::size_of::<T>();
    if data.len() < size {
        return None;
    }
    let (head, tail) = data.split_at(size);
    let mut val = std::mem::MaybeUninit::<T>::uninit();
    unsafe {
        std::ptr::copy_nonoverlapping(head.as_ptr(), val.as_mut_ptr() as *mut u8, size);
        Some((val.assume_init(), tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    #[repr(C)]
    struct Pair {
        a: u32,
        b: u16,
        c: u16,
    }
    unsafe impl Pod for Pair {}

    #[test]
    fn round_trips() {
        let p = Pair { a: 1, b: 2, c: 3 };
        let bytes = bytes_of(&p).to_vec();
        let (q, tail): (Pair, _) = from_bytes(&bytes).unwrap();
        assert_eq!(q.a, 1);
        assert_eq!(q.b, 2);
        assert_eq!(q.c, 3);
        assert!(tail.is_empty());
    }
}
