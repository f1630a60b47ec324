/*
 * Descriptor I/O
 *
 * The operations application code calls with a descriptor number. Each one
 * resolves the number, resolves the owning device, checks the open mode
 * where it matters, and hands off to the device.
 *
 * Error conventions:
 * - EINVAL: bad or closed descriptor, unknown device, wrong open mode
 * - ENOTSUP: the device has no such operation
 * - anything else comes from the device unchanged
 */

use x86_64::VirtAddr;
use x86_64::structures::paging::PageTableFlags;

use super::device::{Errno, Stat};
use super::fd::FdTable;
use crate::config::{DEBUG, MAX_FD, index2data, index2fd};
use crate::memory::{AddressSpace, PTE_SYSCALL};

impl<A: AddressSpace> FdTable<'_, A> {
    /// Close a descriptor
    pub fn close(&mut self, fdnum: i32) -> Result<(), Errno> {
        let slot = self.fd_lookup(fdnum)?;
        self.fd_close(slot, true)
    }

    /// Close every descriptor, ignoring errors
    pub fn close_all(&mut self) {
        for fdnum in 0..MAX_FD as i32 {
            let _ = self.close(fdnum);
        }
    }

    /// Read up to buf.len() bytes
    ///
    /// Returns the number of bytes read; 0 means end of stream.
    pub fn read(&mut self, fdnum: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        let index = self.open_index(fdnum)?;
        let fd = self.load(index)?;
        let dev = self.devices().lookup(self.env_id(), fd.dev_id)?;

        if !fd.omode.can_read() {
            log::warn!("{} read {} -- bad mode", self.env_id(), fdnum);
            return Err(Errno::EINVAL);
        }

        self.with_context(index, |ctx| dev.read(ctx, buf))
    }

    /// Read until buf is full or the stream ends
    ///
    /// Devices may return short reads; this keeps reading until buf.len()
    /// bytes have arrived or a read returns 0. The first error is returned
    /// as-is; bytes already copied stay in buf.
    pub fn readn(&mut self, fdnum: i32, buf: &mut [u8]) -> Result<usize, Errno> {
        let mut tot = 0;
        while tot < buf.len() {
            let m = self.read(fdnum, &mut buf[tot..])?;
            if m == 0 {
                break;
            }
            tot += m;
        }
        Ok(tot)
    }

    /// Write up to buf.len() bytes
    ///
    /// Returns the number of bytes written.
    pub fn write(&mut self, fdnum: i32, buf: &[u8]) -> Result<usize, Errno> {
        let index = self.open_index(fdnum)?;
        let fd = self.load(index)?;
        let dev = self.devices().lookup(self.env_id(), fd.dev_id)?;

        if !fd.omode.can_write() {
            log::warn!("{} write {} -- bad mode", self.env_id(), fdnum);
            return Err(Errno::EINVAL);
        }

        if DEBUG {
            log::debug!(
                "write {} {:p} {} via dev {}",
                fdnum,
                buf.as_ptr(),
                buf.len(),
                dev.name()
            );
        }

        self.with_context(index, |ctx| dev.write(ctx, buf))
    }

    /// Set the descriptor's offset
    ///
    /// The device isn't consulted: devices that ignore offsets (pipes, the
    /// console) still accept this.
    pub fn seek(&mut self, fdnum: i32, offset: u64) -> Result<(), Errno> {
        let index = self.open_index(fdnum)?;
        self.with_context(index, |ctx| {
            ctx.fd.offset = offset;
            Ok(())
        })
    }

    /// Make `newfdnum` a copy of `oldfdnum`
    ///
    /// Any descriptor open at `newfdnum` is closed first. Both the
    /// descriptor page and, if present, the data page are mapped at the new
    /// slot, so the two numbers share one record (offset included) and the
    /// device state in the data page.
    pub fn dup(&mut self, oldfdnum: i32, newfdnum: i32) -> Result<i32, Errno> {
        let old = self.open_index(oldfdnum)?;
        let new = match usize::try_from(newfdnum) {
            Ok(new) if new < MAX_FD => new,
            _ => return Err(Errno::EINVAL),
        };
        if old == new {
            return Ok(newfdnum);
        }

        let _ = self.close(newfdnum);

        let (ova, nva) = (index2data(old), index2data(new));
        let (ofd, nfd) = (index2fd(old), index2fd(new));

        let result = self.map_shared(ova, nva).and_then(|_| self.map_shared(ofd, nfd));
        if let Err(err) = result {
            let vm = self.vm_mut();
            let _ = vm.page_unmap(nfd);
            let _ = vm.page_unmap(nva);
            return Err(err);
        }

        Ok(newfdnum)
    }

    /// Stat the object behind a descriptor
    pub fn fstat(&mut self, fdnum: i32) -> Result<Stat, Errno> {
        let index = self.open_index(fdnum)?;
        let dev = self.devices().lookup(self.env_id(), self.load(index)?.dev_id)?;

        let mut st = Stat {
            st_dev: dev.id(),
            ..Stat::default()
        };
        self.with_context(index, |ctx| dev.stat(ctx, &mut st))?;
        Ok(st)
    }

    /// Change the size of the object behind a descriptor
    pub fn ftruncate(&mut self, fdnum: i32, size: u64) -> Result<(), Errno> {
        let index = self.open_index(fdnum)?;
        let fd = self.load(index)?;
        let dev = self.devices().lookup(self.env_id(), fd.dev_id)?;

        if !fd.omode.can_write() {
            log::warn!("{} ftruncate {} -- bad mode", self.env_id(), fdnum);
            return Err(Errno::EINVAL);
        }

        self.with_context(index, |ctx| dev.trunc(ctx, size))
    }

    /// Map whatever is at `src` at `dst` too, keeping its permissions
    ///
    /// Nothing mapped at `src` is not an error.
    fn map_shared(&mut self, src: VirtAddr, dst: VirtAddr) -> Result<(), Errno> {
        let vm = self.vm_mut();
        if !vm.is_mapped(src) {
            return Ok(());
        }
        let perm: PageTableFlags = vm.pte_flags(src) & PTE_SYSCALL;
        vm.page_map(src, dst, perm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{DevId, DeviceRegistry, Fd, OpenMode};
    use crate::memory::{PTE_USER_RW, SoftAddressSpace};
    use crate::testing::{BareDevice, REC_ID, RecordingDevice, table_with};

    fn open_on(table: &mut FdTable<'_, SoftAddressSpace>, dev_id: DevId, omode: OpenMode) -> i32 {
        let slot = table.fd_alloc().unwrap();
        table.activate(slot, Fd::new(dev_id, omode), PTE_USER_RW).unwrap()
    }

    #[test]
    fn test_write_on_read_only_never_reaches_device() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, REC_ID, OpenMode::RDONLY);
        assert_eq!(table.write(fd, b"nope"), Err(Errno::EINVAL));
        assert_eq!(table.ftruncate(fd, 0), Err(Errno::EINVAL));
        assert_eq!(dev.total_calls(), 0);
    }

    #[test]
    fn test_read_on_write_only_never_reaches_device() {
        let dev = RecordingDevice::new().with_reads(&[b"data"]);
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, REC_ID, OpenMode::WRONLY | OpenMode::CREAT);
        let mut buf = [0u8; 4];
        assert_eq!(table.read(fd, &mut buf), Err(Errno::EINVAL));
        assert_eq!(dev.read_calls(), 0);

        assert_eq!(table.write(fd, b"ok"), Ok(2));
        assert_eq!(dev.write_calls(), 1);
    }

    #[test]
    fn test_readn_stops_at_end_of_stream() {
        let dev = RecordingDevice::new().with_reads(&[b"abc", b"def"]);
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, REC_ID, OpenMode::RDONLY);
        let mut buf = [0u8; 10];
        assert_eq!(table.readn(fd, &mut buf), Ok(6));
        assert_eq!(&buf[..6], b"abcdef");
        assert_eq!(dev.read_calls(), 3);
    }

    #[test]
    fn test_readn_fills_buffer_without_extra_read() {
        let dev = RecordingDevice::new().with_reads(&[b"abcd", b"efgh", b"ijkl"]);
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, REC_ID, OpenMode::RDWR);
        let mut buf = [0u8; 6];
        assert_eq!(table.readn(fd, &mut buf), Ok(6));
        assert_eq!(&buf, b"abcdef");
        assert_eq!(dev.read_calls(), 2);
    }

    #[test]
    fn test_readn_propagates_errors() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, REC_ID, OpenMode::WRONLY);
        let mut buf = [0u8; 4];
        assert_eq!(table.readn(fd, &mut buf), Err(Errno::EINVAL));
        assert_eq!(table.readn(17, &mut buf), Err(Errno::EINVAL));
        // Nothing to read into is trivially complete
        assert_eq!(table.readn(17, &mut []), Ok(0));
    }

    #[test]
    fn test_seek_overwrites_offset_for_any_device() {
        let dev = RecordingDevice::new();
        let bare = BareDevice::new(DevId(2), "bare");
        let registry = DeviceRegistry::from_devices(&[&dev, &bare]).unwrap();
        let mut table = table_with(&registry);

        let rec = open_on(&mut table, REC_ID, OpenMode::RDWR);
        let plain = open_on(&mut table, DevId(2), OpenMode::RDONLY);
        for fd in [rec, plain] {
            table.seek(fd, 42).unwrap();
            assert_eq!(table.get(fd).unwrap().offset, 42);
        }
        assert_eq!(table.seek(9, 1), Err(Errno::EINVAL));
        assert_eq!(dev.total_calls(), 0);
    }

    #[test]
    fn test_missing_capability_is_not_supported() {
        let bare = BareDevice::new(DevId(2), "bare");
        let registry = DeviceRegistry::from_devices(&[&bare]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, DevId(2), OpenMode::RDWR);
        let mut buf = [0u8; 4];
        assert_eq!(table.read(fd, &mut buf), Err(Errno::ENOTSUP));
        assert_eq!(table.write(fd, b"x"), Err(Errno::ENOTSUP));
        assert_eq!(table.fstat(fd).err(), Some(Errno::ENOTSUP));
        assert_eq!(table.ftruncate(fd, 1), Err(Errno::ENOTSUP));
        // No close callback: closing still works
        assert_eq!(table.close(fd), Ok(()));
    }

    #[test]
    fn test_unknown_device_is_invalid() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, DevId(0x55), OpenMode::RDWR);
        let mut buf = [0u8; 4];
        assert_eq!(table.read(fd, &mut buf), Err(Errno::EINVAL));
        assert_eq!(table.write(fd, b"x"), Err(Errno::EINVAL));
        assert_eq!(table.fstat(fd).err(), Some(Errno::EINVAL));
        assert_eq!(table.close(fd), Err(Errno::EINVAL));
        assert_eq!(dev.total_calls(), 0);
        assert!(!table.is_valid(fd));
    }

    #[test]
    fn test_closed_descriptor_is_invalid() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, REC_ID, OpenMode::RDWR);
        table.close(fd).unwrap();
        assert_eq!(table.close(fd), Err(Errno::EINVAL));
        assert_eq!(table.write(fd, b"x"), Err(Errno::EINVAL));
        assert_eq!(dev.close_calls(), 1);
        assert_eq!(dev.write_calls(), 0);
    }

    #[test]
    fn test_dup_shares_record_and_closes_target() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let a = open_on(&mut table, REC_ID, OpenMode::WRONLY);
        let b = open_on(&mut table, REC_ID, OpenMode::RDWR);
        table.seek(a, 12).unwrap();

        assert_eq!(table.dup(a, b), Ok(b));
        assert_eq!(dev.close_calls(), 1);
        assert_eq!(table.get(b).unwrap(), table.get(a).unwrap());
        assert_eq!(table.get(b).unwrap().offset, 12);
        assert_eq!(table.vm().page_ref(index2fd(a as usize)), 2);

        // One record behind both numbers
        table.seek(b, 30).unwrap();
        assert_eq!(table.get(a).unwrap().offset, 30);
        assert_eq!(table.get(b).unwrap().omode, OpenMode::WRONLY);

        assert_eq!(table.dup(a, a), Ok(a));
        assert_eq!(table.dup(a, MAX_FD as i32), Err(Errno::EINVAL));
        assert_eq!(table.dup(20, 3), Err(Errno::EINVAL));
    }

    #[test]
    fn test_dup_shares_data_page() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = FdTable::new(
            crate::io::EnvId(2),
            SoftAddressSpace::with_frame_limit(2),
            &registry,
        );

        let a = open_on(&mut table, REC_ID, OpenMode::RDWR);
        let ro = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;
        table.vm_mut().page_alloc(index2data(a as usize), ro).unwrap();

        // Sharing takes no new frames, so this works at the limit
        assert_eq!(table.dup(a, 4), Ok(4));
        assert_eq!(table.count(), 2);
        assert!(table.vm().is_mapped(index2data(4)));
        assert_eq!(table.vm().pte_flags(index2data(4)), ro);
        assert_eq!(table.vm().page_ref(index2data(a as usize)), 2);
        assert_eq!(table.vm().frames_in_use(), 2);
    }

    #[test]
    fn test_fstat_of_closed_descriptor() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        let fd = open_on(&mut table, REC_ID, OpenMode::RDWR);
        assert_eq!(table.fstat(fd).err(), Some(Errno::ENOTSUP));
        table.close(fd).unwrap();
        assert_eq!(table.fstat(fd).err(), Some(Errno::EINVAL));
    }

    #[test]
    fn test_close_all() {
        let dev = RecordingDevice::new();
        let registry = DeviceRegistry::from_devices(&[&dev]).unwrap();
        let mut table = table_with(&registry);

        for _ in 0..5 {
            open_on(&mut table, REC_ID, OpenMode::RDWR);
        }
        table.close(2).unwrap();
        table.close_all();
        assert_eq!(table.count(), 0);
        assert_eq!(dev.close_calls(), 5);
    }
}
