//! # ELF Segment Mapper
//!
//! Maps the boot image's load segments. A boot image is normally a couple of
//! physically contiguous segments, which deserve large leaves; the mapper
//! must not assume that, though.
//!
//! ```text
//!            accept                    accept (pending = MAX)
//! Buffering ────────► Buffering ──────────────────────────► Coalescing
//!     │                   │                                     │
//!     │ misaligned, gap   │ misaligned, gap                     │ any further segment
//!     ▼                   ▼                                     ▼
//!  Fallback ◄─────────────────────────────────────────────────────
//!     │
//!     ▼ finalize
//! Finalized ◄──────────────────────── finalize ─────────── Buffering / Coalescing
//! ```
//!
//! - An accepted segment is block mapped right away.
//! - Entering **Fallback** unmaps those speculative blocks and maps every
//!   pending segment plus the current one with 4 KiB pages, each with its
//!   own protection. Fallback is sticky: later segments go straight to
//!   the page mapper.
//! - **Finalize** verifies the block mappings through the reverse
//!   translator on every core.

use crate::{MmuError, PAGE_SIZE, Protection, TranslationScheme, checked_align_up};
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress};

/// Load segments of a two-segment boot image (text and data).
pub const MAX_PENDING_SEGMENTS: usize = 2;

/// One loadable segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub va: VirtualAddress,
    pub pa: PhysicalAddress,
    pub len: u64,
    pub prot: Protection,
}

impl Segment {
    #[must_use]
    pub const fn new(va: VirtualAddress, pa: PhysicalAddress, len: u64, prot: Protection) -> Self {
        Self { va, pa, len, prot }
    }

    #[inline]
    fn physical_end(&self) -> Option<u64> {
        self.pa.as_u64().checked_add(self.len)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentState {
    /// Fewer than [`MAX_PENDING_SEGMENTS`] block-mapped segments pending.
    Buffering,
    /// The pending set is full and still contiguous.
    Coalescing,
    /// Page mapping for the rest of the sequence.
    Fallback,
    Finalized,
}

/// Granularity the segments ended up mapped with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentMode {
    Blocks,
    Pages,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SegmentOutcome {
    pub mode: SegmentMode,
    /// Large leaves left installed (per core).
    pub blocks: usize,
    /// 4 KiB leaves installed (per core).
    pub pages: usize,
}

/// Segment bookkeeping that outlives any one borrow of the scheme.
///
/// The boot sequence interleaves segment pushes with other mappings, so the
/// pending set and the state live here and the scheme is passed per call.
/// [`ElfSegmentMapper`] pairs the two for convenience.
#[derive(Clone, Debug)]
pub struct SegmentBuffer {
    pending: [Option<Segment>; MAX_PENDING_SEGMENTS],
    count: usize,
    state: SegmentState,
    blocks: usize,
    pages: usize,
}

impl Default for SegmentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: [None; MAX_PENDING_SEGMENTS],
            count: 0,
            state: SegmentState::Buffering,
            blocks: 0,
            pages: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    /// Segments currently block mapped and awaiting finalize.
    pub fn pending(&self) -> impl Iterator<Item = &Segment> {
        self.pending[..self.count].iter().flatten()
    }

    /// Map one segment through `scheme`.
    ///
    /// # Errors
    /// [`MmuError::SegmentSealed`] after [`finalize`](Self::finalize);
    /// otherwise whatever the scheme reports.
    pub fn push<S: TranslationScheme + ?Sized>(
        &mut self,
        scheme: &mut S,
        segment: Segment,
    ) -> Result<(), MmuError> {
        match self.state {
            SegmentState::Finalized => Err(MmuError::SegmentSealed),
            SegmentState::Fallback => self.map_pages(scheme, &segment),
            SegmentState::Buffering | SegmentState::Coalescing => {
                if self.count < MAX_PENDING_SEGMENTS && self.coalescable(&*scheme, &segment) {
                    self.accept(scheme, segment)
                } else {
                    self.fall_back(scheme, segment)
                }
            }
        }
    }

    /// Close the sequence and check the result.
    ///
    /// # Errors
    /// - [`MmuError::SegmentSealed`] when called twice.
    /// - [`MmuError::SegmentVerification`] if a coalesced segment does not
    ///   translate back to its physical range on some core.
    pub fn finalize<S: TranslationScheme + ?Sized>(
        &mut self,
        scheme: &S,
    ) -> Result<SegmentOutcome, MmuError> {
        let mode = match self.state {
            SegmentState::Finalized => return Err(MmuError::SegmentSealed),
            SegmentState::Fallback => SegmentMode::Pages,
            SegmentState::Buffering | SegmentState::Coalescing => {
                self.verify_blocks(scheme)?;
                SegmentMode::Blocks
            }
        };
        self.state = SegmentState::Finalized;

        let outcome = SegmentOutcome {
            mode,
            blocks: self.blocks,
            pages: self.pages,
        };
        log::info!(
            "boot image mapped with {:?}: {} blocks, {} pages",
            outcome.mode,
            outcome.blocks,
            outcome.pages
        );
        Ok(outcome)
    }

    fn coalescable<S: TranslationScheme + ?Sized>(&self, scheme: &S, segment: &Segment) -> bool {
        let block = scheme.block_size();
        if !segment.va.as_addr().is_aligned_to(block) || !segment.pa.as_addr().is_aligned_to(block)
        {
            return false;
        }
        let Some(span) = block_span(scheme, segment) else {
            return false;
        };
        let contiguous = match self.count.checked_sub(1).and_then(|i| self.pending[i]) {
            None => true,
            Some(previous) => previous.physical_end() == Some(segment.pa.as_u64()),
        };
        // Anything already linked or mapped there must survive a later fallback.
        contiguous && scheme.block_slots_free(segment.va, span)
    }

    fn accept<S: TranslationScheme + ?Sized>(
        &mut self,
        scheme: &mut S,
        segment: Segment,
    ) -> Result<(), MmuError> {
        let span = block_span(&*scheme, &segment).ok_or(MmuError::VirtualOutOfRange {
            addr: segment.va,
            len: segment.len,
        })?;
        match scheme.block_map(segment.va, segment.pa, span, segment.prot) {
            Ok(_) => {}
            Err(MmuError::TableConflict { .. }) => return self.fall_back(scheme, segment),
            Err(e) => return Err(e),
        }

        self.pending[self.count] = Some(segment);
        self.count += 1;
        self.blocks += usize::try_from(span / scheme.block_size()).unwrap_or(usize::MAX);
        self.state = if self.count == MAX_PENDING_SEGMENTS {
            SegmentState::Coalescing
        } else {
            SegmentState::Buffering
        };
        log::debug!(
            "segment {} -> {} coalesced ({} pending)",
            segment.va,
            segment.pa,
            self.count
        );
        Ok(())
    }

    fn fall_back<S: TranslationScheme + ?Sized>(
        &mut self,
        scheme: &mut S,
        segment: Segment,
    ) -> Result<(), MmuError> {
        log::warn!(
            "segment {} -> {} is not block-contiguous, falling back to pages",
            segment.va,
            segment.pa
        );

        let pending = core::mem::replace(&mut self.pending, [None; MAX_PENDING_SEGMENTS]);
        let count = core::mem::take(&mut self.count);
        self.state = SegmentState::Fallback;

        for previous in pending[..count].iter().flatten() {
            if let Some(span) = block_span(&*scheme, previous) {
                scheme.block_unmap(previous.va, span)?;
            }
        }
        self.blocks = 0;

        for previous in pending[..count].iter().flatten() {
            self.map_pages(scheme, previous)?;
        }
        self.map_pages(scheme, &segment)
    }

    fn map_pages<S: TranslationScheme + ?Sized>(
        &mut self,
        scheme: &mut S,
        segment: &Segment,
    ) -> Result<(), MmuError> {
        scheme.map(Some(segment.va), segment.pa, segment.len, segment.prot)?;
        self.pages += page_count(segment);
        Ok(())
    }

    fn verify_blocks<S: TranslationScheme + ?Sized>(&self, scheme: &S) -> Result<(), MmuError> {
        let block = scheme.block_size();
        for segment in self.pending() {
            let span = block_span(scheme, segment).unwrap_or(0);
            let mut offset = 0;
            while offset < span {
                let va = segment
                    .va
                    .checked_add(offset)
                    .ok_or(MmuError::SegmentVerification { addr: segment.va })?;
                let expected = segment.pa + offset;
                for core in 0..scheme.cores() {
                    if scheme.translate(core, va) != Some(expected) {
                        return Err(MmuError::SegmentVerification { addr: va });
                    }
                }
                offset += block;
            }
        }
        Ok(())
    }
}

/// A [`SegmentBuffer`] bound to the scheme it maps into.
pub struct ElfSegmentMapper<'s, S: TranslationScheme + ?Sized> {
    scheme: &'s mut S,
    buffer: &'s mut SegmentBuffer,
}

impl<'s, S: TranslationScheme + ?Sized> ElfSegmentMapper<'s, S> {
    pub const fn new(scheme: &'s mut S, buffer: &'s mut SegmentBuffer) -> Self {
        Self { scheme, buffer }
    }

    #[inline]
    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.buffer.state()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Segment> {
        self.buffer.pending()
    }

    /// See [`SegmentBuffer::push`].
    ///
    /// # Errors
    /// As for [`SegmentBuffer::push`].
    pub fn push(&mut self, segment: Segment) -> Result<(), MmuError> {
        self.buffer.push(&mut *self.scheme, segment)
    }

    /// See [`SegmentBuffer::finalize`].
    ///
    /// # Errors
    /// As for [`SegmentBuffer::finalize`].
    pub fn finalize(&mut self) -> Result<SegmentOutcome, MmuError> {
        self.buffer.finalize(&*self.scheme)
    }
}

/// Whole blocks covering a segment.
fn block_span<S: TranslationScheme + ?Sized>(scheme: &S, segment: &Segment) -> Option<u64> {
    checked_align_up(segment.len, scheme.block_size())
}

/// 4 KiB pages touched by a segment.
fn page_count(segment: &Segment) -> usize {
    if segment.len == 0 {
        return 0;
    }
    let offset = segment.pa.offset::<Size4K>().as_u64();
    let span = checked_align_up(offset + segment.len, PAGE_SIZE).unwrap_or(u64::MAX);
    usize::try_from(span / PAGE_SIZE).unwrap_or(usize::MAX)
}
