//! Process memory allocator
//!
//! Carves page-granular stack and heap regions out of one fixed window of
//! identity-mapped RAM. Mapping is identity, so establishing a mapping is
//! just recording the region: the base handed to a process is the physical
//! address.
//!
//! Each bit in the bitmap represents one 4KB page:
//! - 1 = allocated
//! - 0 = free
//!
//! Regions are named by a [`RegionHandle`] (table slot + generation) so a
//! handle kept after release can never alias a later region that reuses the
//! same slot.

use crate::error::MemoryError;
use crate::process::ProcessId;

pub const PAGE_SIZE: usize = 4096;

/// Region table capacity
pub const MAX_REGIONS: usize = 128;

const BITMAP_WORDS: usize = 512;
const BITS_PER_ENTRY: usize = 64;

/// Largest window the bitmap can describe (128 MiB)
pub const MAX_WINDOW_PAGES: usize = BITMAP_WORDS * BITS_PER_ENTRY;

/// Stable name of a live region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHandle {
    slot: u16,
    generation: u16,
}

impl RegionHandle {
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

/// A contiguous run of pages owned by one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: usize,
    pub len: usize,
    pub owner: ProcessId,
}

impl Region {
    pub fn end(&self) -> usize {
        self.base + self.len
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base && addr < self.end()
    }
}

#[derive(Clone, Copy)]
struct RegionSlot {
    region: Option<Region>,
    generation: u16,
}

impl RegionSlot {
    const EMPTY: Self = Self {
        region: None,
        generation: 0,
    };
}

/// Bitmap page allocator plus the table of live regions.
///
/// # Invariants
///
/// - `free_pages` always equals the number of zero bits below `total_pages`
/// - every live region covers exactly the set bits of its page range
/// - a region has exactly one owner and is released at most once
pub struct RegionAllocator {
    bitmap: [u64; BITMAP_WORDS],
    regions: [RegionSlot; MAX_REGIONS],
    window_base: usize,
    total_pages: usize,
    free_pages: usize,
}

impl RegionAllocator {
    /// An allocator with no window; every request fails until [`init`].
    ///
    /// [`init`]: RegionAllocator::init
    pub const fn empty() -> Self {
        Self {
            bitmap: [0; BITMAP_WORDS],
            regions: [RegionSlot::EMPTY; MAX_REGIONS],
            window_base: 0,
            total_pages: 0,
            free_pages: 0,
        }
    }

    pub fn new(base: usize, size: usize) -> Result<Self, MemoryError> {
        let mut alloc = Self::empty();
        alloc.init(base, size)?;
        Ok(alloc)
    }

    /// Hand the window `[base, base + size)` to the allocator.
    ///
    /// Any previous state is discarded. A trailing partial page is ignored.
    pub fn init(&mut self, base: usize, size: usize) -> Result<(), MemoryError> {
        let pages = size / PAGE_SIZE;
        if base % PAGE_SIZE != 0 || pages == 0 || pages > MAX_WINDOW_PAGES {
            return Err(MemoryError::InvalidWindow);
        }

        *self = Self::empty();
        self.window_base = base;
        self.total_pages = pages;
        self.free_pages = pages;
        Ok(())
    }

    pub fn window(&self) -> (usize, usize) {
        (self.window_base, self.total_pages * PAGE_SIZE)
    }

    pub fn free_pages(&self) -> usize {
        self.free_pages
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Allocate `size` bytes (rounded up to whole pages) for `owner`.
    ///
    /// First fit from the start of the window.
    pub fn allocate(&mut self, size: usize, owner: ProcessId) -> Result<RegionHandle, MemoryError> {
        if size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        // Sizes come straight from a register; no rounding may overflow
        let pages = size.div_ceil(PAGE_SIZE);
        if pages > self.free_pages {
            return Err(MemoryError::Exhausted);
        }

        let slot = self
            .regions
            .iter()
            .position(|s| s.region.is_none())
            .ok_or(MemoryError::TooManyRegions)?;
        let first = self.find_run(pages).ok_or(MemoryError::Exhausted)?;

        self.mark(first, pages, true);
        self.free_pages -= pages;

        let entry = &mut self.regions[slot];
        entry.region = Some(Region {
            base: self.window_base + first * PAGE_SIZE,
            len: pages * PAGE_SIZE,
            owner,
        });

        Ok(RegionHandle {
            slot: slot as u16,
            generation: entry.generation,
        })
    }

    /// Look up a live region by handle.
    pub fn region(&self, handle: RegionHandle) -> Option<&Region> {
        let entry = self.regions.get(handle.slot())?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.region.as_ref()
    }

    /// Release a region on behalf of `owner`.
    pub fn release(&mut self, handle: RegionHandle, owner: ProcessId) -> Result<(), MemoryError> {
        let entry = self
            .regions
            .get(handle.slot())
            .ok_or(MemoryError::UnknownRegion)?;

        // A bumped generation means this handle was already spent
        if entry.generation != handle.generation {
            return Err(MemoryError::AlreadyReleased);
        }
        let region = entry.region.ok_or(MemoryError::AlreadyReleased)?;
        if region.owner != owner {
            return Err(MemoryError::NotOwner);
        }

        self.free_slot(handle.slot());
        Ok(())
    }

    /// Find the live region whose base is exactly `base`.
    pub fn find(&self, base: usize) -> Option<(RegionHandle, &Region)> {
        self.regions.iter().enumerate().find_map(|(slot, entry)| {
            let region = entry.region.as_ref()?;
            (region.base == base).then_some((
                RegionHandle {
                    slot: slot as u16,
                    generation: entry.generation,
                },
                region,
            ))
        })
    }

    /// Release the region starting at `base`, as the heap-free syscall does.
    ///
    /// An address inside the window that no longer starts a live region is
    /// reported as `AlreadyReleased`; anything else as `UnknownRegion`.
    pub fn release_at(&mut self, base: usize, owner: ProcessId) -> Result<(), MemoryError> {
        match self.find(base) {
            Some((handle, _)) => self.release(handle, owner),
            None if self.in_window(base) && base % PAGE_SIZE == 0 => {
                Err(MemoryError::AlreadyReleased)
            }
            None => Err(MemoryError::UnknownRegion),
        }
    }

    /// Release every region `owner` still holds. Returns how many.
    pub fn release_owned_by(&mut self, owner: ProcessId) -> usize {
        let mut released = 0;
        for slot in 0..MAX_REGIONS {
            if self.regions[slot].region.is_some_and(|r| r.owner == owner) {
                self.free_slot(slot);
                released += 1;
            }
        }
        released
    }

    /// Live regions owned by `owner`.
    pub fn owned_by(&self, owner: ProcessId) -> impl Iterator<Item = &Region> {
        self.regions
            .iter()
            .filter_map(|s| s.region.as_ref())
            .filter(move |r| r.owner == owner)
    }

    fn in_window(&self, addr: usize) -> bool {
        addr >= self.window_base && addr < self.window_base + self.total_pages * PAGE_SIZE
    }

    fn free_slot(&mut self, slot: usize) {
        let entry = &mut self.regions[slot];
        if let Some(region) = entry.region.take() {
            entry.generation = entry.generation.wrapping_add(1);
            let first = (region.base - self.window_base) / PAGE_SIZE;
            let pages = region.len / PAGE_SIZE;
            self.mark(first, pages, false);
            self.free_pages += pages;
        }
    }

    /// Get the bitmap entry and bit position for a page index.
    #[inline]
    fn bitmap_pos(page: usize) -> (usize, usize) {
        (page / BITS_PER_ENTRY, page % BITS_PER_ENTRY)
    }

    #[inline]
    fn is_page_free(&self, page: usize) -> bool {
        let (entry, bit) = Self::bitmap_pos(page);
        (self.bitmap[entry] >> bit) & 1 == 0
    }

    fn mark(&mut self, first: usize, pages: usize, allocated: bool) {
        for page in first..first + pages {
            let (entry, bit) = Self::bitmap_pos(page);
            if allocated {
                self.bitmap[entry] |= 1 << bit;
            } else {
                self.bitmap[entry] &= !(1 << bit);
            }
        }
    }

    fn find_run(&self, pages: usize) -> Option<usize> {
        let mut run_start = 0;
        let mut run_len = 0;
        for page in 0..self.total_pages {
            if self.is_page_free(page) {
                if run_len == 0 {
                    run_start = page;
                }
                run_len += 1;
                if run_len == pages {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }
}

impl Default for RegionAllocator {
    fn default() -> Self {
        Self::empty()
    }
}
