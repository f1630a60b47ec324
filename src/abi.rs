/*
 * C-Style Descriptor ABI
 *
 * The same operations as FdTable, in the calling convention C programs and
 * the shell expect: a byte count or 0 on success, a negative errno on
 * failure.
 */

use crate::io::{Errno, FdTable, Stat};
use crate::memory::AddressSpace;

fn ret_count(r: Result<usize, Errno>) -> isize {
    match r {
        Ok(n) => n as isize,
        Err(err) => err.as_neg() as isize,
    }
}

fn ret_status(r: Result<(), Errno>) -> i32 {
    match r {
        Ok(()) => 0,
        Err(err) => err.as_neg(),
    }
}

pub fn read<A: AddressSpace>(table: &mut FdTable<'_, A>, fdnum: i32, buf: &mut [u8]) -> isize {
    ret_count(table.read(fdnum, buf))
}

pub fn readn<A: AddressSpace>(table: &mut FdTable<'_, A>, fdnum: i32, buf: &mut [u8]) -> isize {
    ret_count(table.readn(fdnum, buf))
}

pub fn write<A: AddressSpace>(table: &mut FdTable<'_, A>, fdnum: i32, buf: &[u8]) -> isize {
    ret_count(table.write(fdnum, buf))
}

pub fn seek<A: AddressSpace>(table: &mut FdTable<'_, A>, fdnum: i32, offset: u64) -> i32 {
    ret_status(table.seek(fdnum, offset))
}

pub fn close<A: AddressSpace>(table: &mut FdTable<'_, A>, fdnum: i32) -> i32 {
    ret_status(table.close(fdnum))
}

/// Returns `newfdnum` on success
pub fn dup<A: AddressSpace>(table: &mut FdTable<'_, A>, oldfdnum: i32, newfdnum: i32) -> i32 {
    match table.dup(oldfdnum, newfdnum) {
        Ok(fd) => fd,
        Err(err) => err.as_neg(),
    }
}

pub fn fstat<A: AddressSpace>(table: &mut FdTable<'_, A>, fdnum: i32, st: &mut Stat) -> i32 {
    ret_status(table.fstat(fdnum).map(|found| *st = found))
}

pub fn ftruncate<A: AddressSpace>(table: &mut FdTable<'_, A>, fdnum: i32, size: u64) -> i32 {
    ret_status(table.ftruncate(fdnum, size))
}
