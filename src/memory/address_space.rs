/*
 * Address Space Interface
 *
 * The descriptor layer owns no kernel table. It only sees its own address
 * space through the primitives below:
 *
 * 1. ALLOCATION: page_alloc maps a fresh zeroed page at an address
 * 2. SHARING: page_map maps the page behind one address at another
 * 3. RELEASE: page_unmap drops a mapping (no-op if nothing is mapped)
 * 4. INTROSPECTION: pde_flags/pte_flags/page_ref read the page tables
 *
 * Page contents are accessed by copying in and out, so implementations are
 * free to back pages however they like.
 */

use x86_64::VirtAddr;
use x86_64::structures::paging::PageTableFlags;

use crate::io::Errno;

/// Pages with this bit set are shared, not copied, across fork and spawn
pub const PTE_SHARE: PageTableFlags = PageTableFlags::BIT_10;

/// Default permissions for descriptor and data pages
pub const PTE_USER_RW: PageTableFlags = PageTableFlags::PRESENT
    .union(PageTableFlags::WRITABLE)
    .union(PageTableFlags::USER_ACCESSIBLE);

/// Bits an environment is allowed to pass to page_alloc/page_map
pub const PTE_SYSCALL: PageTableFlags = PTE_USER_RW
    .union(PageTableFlags::BIT_9)
    .union(PageTableFlags::BIT_10)
    .union(PageTableFlags::BIT_11);

/// Page directory index of an address
#[inline]
pub fn pdx(va: VirtAddr) -> usize {
    ((va.as_u64() >> 22) & 0x3ff) as usize
}

/// Page table index of an address
#[inline]
pub fn ptx(va: VirtAddr) -> usize {
    ((va.as_u64() >> 12) & 0x3ff) as usize
}

/// Virtual memory primitives of the current environment
pub trait AddressSpace {
    /// Map a fresh zeroed page at `va`, replacing any existing mapping
    fn page_alloc(&mut self, va: VirtAddr, perm: PageTableFlags) -> Result<(), Errno>;

    /// Map the page currently mapped at `src` at `dst` as well
    fn page_map(&mut self, src: VirtAddr, dst: VirtAddr, perm: PageTableFlags)
    -> Result<(), Errno>;

    /// Remove the mapping at `va`
    ///
    /// Unmapping an address that has no mapping succeeds.
    fn page_unmap(&mut self, va: VirtAddr) -> Result<(), Errno>;

    /// Flags of the directory entry covering `va` (empty if absent)
    fn pde_flags(&self, va: VirtAddr) -> PageTableFlags;

    /// Flags of the page table entry for `va` (empty if absent)
    fn pte_flags(&self, va: VirtAddr) -> PageTableFlags;

    /// Number of mappings referring to the page behind `va` (0 if unmapped)
    fn page_ref(&self, va: VirtAddr) -> usize;

    /// Copy `buf.len()` bytes out of the page at `va`, starting at `offset`
    fn read_page(&self, va: VirtAddr, offset: usize, buf: &mut [u8]) -> Result<(), Errno>;

    /// Copy `data` into the page at `va`, starting at `offset`
    fn write_page(&mut self, va: VirtAddr, offset: usize, data: &[u8]) -> Result<(), Errno>;

    /// True when both levels of translation for `va` are present
    fn is_mapped(&self, va: VirtAddr) -> bool {
        self.pde_flags(va).contains(PageTableFlags::PRESENT)
            && self.pte_flags(va).contains(PageTableFlags::PRESENT)
    }
}
