//! Memory interfaces: the host allocator contract and guest-address
//! translation.
//!
//! The engine never calls the global allocator directly; every arena byte
//! comes from an [`Allocator`] the host supplies. Guest code is reached
//! through a [`MemoryInterface`], which maps a guest-virtual address to a
//! host slice covering the readable extent behind it.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::error::Error;

/// Host-supplied aligned allocation callbacks.
///
/// Implementations must honor the alignment of the requested layout; the
/// engine asks for 64 bytes.
pub trait Allocator {
    /// Allocate `layout.size()` bytes at `layout.align()`. None on failure.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Release an allocation.
    ///
    /// # Safety
    ///
    /// `pointer` must come from a previous [`Allocator::allocate`] on the
    /// same allocator with the same `layout`, and must not be used again.
    unsafe fn free(&self, pointer: NonNull<u8>, layout: Layout);
}

/// The process heap, exposed through the allocator contract.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: layout has a non-zero size.
        let pointer = unsafe { std::alloc::alloc(layout) };
        NonNull::new(pointer)
    }

    unsafe fn free(&self, pointer: NonNull<u8>, layout: Layout) {
        // SAFETY: the caller guarantees pointer/layout came from allocate.
        unsafe { std::alloc::dealloc(pointer.as_ptr(), layout) };
    }
}

/// Guest-virtual to host translation.
///
/// A successful translation returns the host bytes starting at the guest
/// address; the slice length is the contiguous readable extent. None means
/// unmapped or invalid.
pub trait MemoryInterface {
    fn translate(&self, guest_address: u64) -> Option<&[u8]>;
}

/// Identity mapping of a single contiguous host buffer: guest address `a`
/// resolves to `base + a` for `0 < a < size`. Guest address zero is never
/// mapped. The caller retains ownership of the buffer.
#[derive(Debug)]
pub struct FlatMemory<'a> {
    base: &'a [u8],
}

impl<'a> FlatMemory<'a> {
    /// The buffer must be non-empty and 16-byte aligned (ABI-ready).
    pub fn new(base: &'a [u8]) -> Result<FlatMemory<'a>, Error> {
        if base.is_empty() {
            return Err(Error::InvalidArgument);
        }
        if base.as_ptr() as usize % 16 != 0 {
            return Err(Error::MemoryAlignment);
        }
        Ok(FlatMemory { base })
    }
}

impl MemoryInterface for FlatMemory<'_> {
    fn translate(&self, guest_address: u64) -> Option<&[u8]> {
        if guest_address == 0 {
            return None;
        }
        let offset = usize::try_from(guest_address).ok()?;
        if offset >= self.base.len() {
            return None;
        }
        // The tail slice length is the readable extent size - a
        Some(&self.base[offset..])
    }
}

/// An owned byte buffer with 16-byte alignment, for staging guest code
/// behind a [`FlatMemory`]. Allocated through the allocator contract like
/// every other buffer the drivers hand to the engine.
#[derive(Debug)]
pub struct AlignedBuffer<A: Allocator = SystemAllocator> {
    data: NonNull<u8>,
    layout: Layout,
    allocator: A,
}

impl AlignedBuffer<SystemAllocator> {
    pub fn new(size: usize) -> Result<AlignedBuffer<SystemAllocator>, Error> {
        AlignedBuffer::with_allocator(SystemAllocator, size)
    }
}

impl<A: Allocator> AlignedBuffer<A> {
    pub fn with_allocator(allocator: A, size: usize) -> Result<AlignedBuffer<A>, Error> {
        if size == 0 {
            return Err(Error::InvalidArgument);
        }
        let layout = Layout::from_size_align(size, 16).map_err(|_| Error::InvalidArgument)?;
        let data = allocator.allocate(layout).ok_or(Error::AllocationFailed)?;
        // SAFETY: data is valid for layout.size() writes.
        unsafe { std::ptr::write_bytes(data.as_ptr(), 0, size) };
        Ok(AlignedBuffer { data, layout, allocator })
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: data holds layout.size() initialized bytes owned by self.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.layout.size()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as as_slice, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.layout.size()) }
    }
}

impl<A: Allocator> Drop for AlignedBuffer<A> {
    fn drop(&mut self) {
        // SAFETY: data was allocated by self.allocator with self.layout.
        unsafe { self.allocator.free(self.data, self.layout) };
    }
}

// SAFETY: the buffer is exclusively owned heap memory.
unsafe impl<A: Allocator + Send> Send for AlignedBuffer<A> {}
