/*
 * Software Page Table
 *
 * An AddressSpace kept entirely in memory: a two-level table (directory of
 * page tables) whose entries point at reference-counted frames. page_map
 * shares a frame between two addresses, exactly like mapping the same
 * physical page twice, so page_ref reports real sharing.
 *
 * Used when running the descriptor layer hosted (tools, unit tests) and as
 * the reference behaviour for kernel-backed implementations.
 */

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use core::cell::RefCell;

use x86_64::VirtAddr;
use x86_64::structures::paging::PageTableFlags;

use super::address_space::{AddressSpace, PTE_SYSCALL, PTE_USER_RW, pdx, ptx};
use crate::config::PGSIZE;
use crate::io::Errno;

const PAGE_BYTES: usize = PGSIZE as usize;

type Frame = Rc<RefCell<[u8; PAGE_BYTES]>>;

/// Leaf entry: a frame and its permissions
struct Pte {
    frame: Frame,
    flags: PageTableFlags,
}

/// Second-level table, sparse
#[derive(Default)]
struct PageTable {
    entries: BTreeMap<usize, Pte>,
}

/// In-memory two-level address space
#[derive(Default)]
pub struct SoftAddressSpace {
    directory: BTreeMap<usize, PageTable>,
    frames_in_use: usize,
    frame_limit: Option<usize>,
}

impl SoftAddressSpace {
    /// Create an empty address space with no frame limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty address space that fails page_alloc with ENOMEM once
    /// `limit` frames are live
    pub fn with_frame_limit(limit: usize) -> Self {
        Self {
            frame_limit: Some(limit),
            ..Self::default()
        }
    }

    /// Number of distinct frames currently mapped somewhere
    pub fn frames_in_use(&self) -> usize {
        self.frames_in_use
    }

    /// Drop the whole directory entry covering `va`, with every page in it
    pub fn unmap_table(&mut self, va: VirtAddr) {
        if let Some(table) = self.directory.remove(&pdx(va)) {
            for (_, pte) in table.entries {
                self.release(pte.frame);
            }
        }
    }

    fn check_va(va: VirtAddr) -> Result<(), Errno> {
        if va.as_u64() % PGSIZE != 0 {
            return Err(Errno::EINVAL);
        }
        Ok(())
    }

    fn check_perm(perm: PageTableFlags) -> Result<(), Errno> {
        if !perm.contains(PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE)
            || !PTE_SYSCALL.contains(perm)
        {
            return Err(Errno::EINVAL);
        }
        Ok(())
    }

    fn lookup(&self, va: VirtAddr) -> Option<&Pte> {
        self.directory.get(&pdx(va))?.entries.get(&ptx(va))
    }

    fn insert(&mut self, va: VirtAddr, pte: Pte) {
        let table = self.directory.entry(pdx(va)).or_default();
        if let Some(old) = table.entries.insert(ptx(va), pte) {
            self.release(old.frame);
        }
    }

    fn release(&mut self, frame: Frame) {
        if Rc::strong_count(&frame) == 1 {
            self.frames_in_use -= 1;
        }
    }

    fn page_range(offset: usize, len: usize) -> Result<core::ops::Range<usize>, Errno> {
        let end = offset.checked_add(len).ok_or(Errno::EFAULT)?;
        if end > PAGE_BYTES {
            return Err(Errno::EFAULT);
        }
        Ok(offset..end)
    }
}

impl AddressSpace for SoftAddressSpace {
    fn page_alloc(&mut self, va: VirtAddr, perm: PageTableFlags) -> Result<(), Errno> {
        Self::check_va(va)?;
        Self::check_perm(perm)?;

        if let Some(limit) = self.frame_limit {
            if self.frames_in_use >= limit {
                return Err(Errno::ENOMEM);
            }
        }

        let frame = Rc::new(RefCell::new([0u8; PAGE_BYTES]));
        self.frames_in_use += 1;
        self.insert(va, Pte { frame, flags: perm });
        Ok(())
    }

    fn page_map(
        &mut self,
        src: VirtAddr,
        dst: VirtAddr,
        perm: PageTableFlags,
    ) -> Result<(), Errno> {
        Self::check_va(src)?;
        Self::check_va(dst)?;
        Self::check_perm(perm)?;

        let source = self.lookup(src).ok_or(Errno::EINVAL)?;
        // Can't grant write access to a read-only page
        if perm.contains(PageTableFlags::WRITABLE)
            && !source.flags.contains(PageTableFlags::WRITABLE)
        {
            return Err(Errno::EINVAL);
        }

        let frame = Rc::clone(&source.frame);
        self.insert(dst, Pte { frame, flags: perm });
        Ok(())
    }

    fn page_unmap(&mut self, va: VirtAddr) -> Result<(), Errno> {
        Self::check_va(va)?;

        let removed = self
            .directory
            .get_mut(&pdx(va))
            .and_then(|table| table.entries.remove(&ptx(va)));
        if let Some(pte) = removed {
            self.release(pte.frame);
        }
        Ok(())
    }

    fn pde_flags(&self, va: VirtAddr) -> PageTableFlags {
        if self.directory.contains_key(&pdx(va)) {
            PTE_USER_RW
        } else {
            PageTableFlags::empty()
        }
    }

    fn pte_flags(&self, va: VirtAddr) -> PageTableFlags {
        self.lookup(va)
            .map(|pte| pte.flags)
            .unwrap_or(PageTableFlags::empty())
    }

    fn page_ref(&self, va: VirtAddr) -> usize {
        self.lookup(va)
            .map(|pte| Rc::strong_count(&pte.frame))
            .unwrap_or(0)
    }

    fn read_page(&self, va: VirtAddr, offset: usize, buf: &mut [u8]) -> Result<(), Errno> {
        let range = Self::page_range(offset, buf.len())?;
        let pte = self.lookup(va).ok_or(Errno::EFAULT)?;
        buf.copy_from_slice(&pte.frame.borrow()[range]);
        Ok(())
    }

    fn write_page(&mut self, va: VirtAddr, offset: usize, data: &[u8]) -> Result<(), Errno> {
        let range = Self::page_range(offset, data.len())?;
        let pte = self.lookup(va).ok_or(Errno::EFAULT)?;
        if !pte.flags.contains(PageTableFlags::WRITABLE) {
            return Err(Errno::EFAULT);
        }
        pte.frame.borrow_mut()[range].copy_from_slice(data);
        Ok(())
    }
}
