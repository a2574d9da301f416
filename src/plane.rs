//! Read-only, position-independent view over one plane of a camera frame.
//!
//! Camera hardware hands out planes as shared buffers with a base offset, a
//! limit and independent row/pixel strides. [`PlaneDescriptor`] never carries a
//! read cursor: every access is an absolute `read_at`, so several readers can
//! share the same backing bytes.

/// One color plane of a source frame.
#[derive(Debug, Clone, Copy)]
pub struct PlaneDescriptor<'a> {
    data: &'a [u8],
    row_stride: usize,
    pixel_stride: usize,
    base: usize,
    limit: usize,
}

impl<'a> PlaneDescriptor<'a> {
    /// Plane covering the whole buffer (`base = 0`, `limit = data.len()`).
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride: pixel_stride.max(1),
            base: 0,
            limit: data.len(),
        }
    }

    /// Restrict valid reads to `[base, limit)`. The limit is clamped to the
    /// buffer length so a descriptor can never index past its bytes.
    pub fn with_window(mut self, base: usize, limit: usize) -> Self {
        self.base = base;
        self.limit = limit.min(self.data.len());
        self
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Absolute offset of the first byte of `row`, if representable.
    pub fn row_start(&self, row: usize) -> Option<usize> {
        row.checked_mul(self.row_stride)?.checked_add(self.base)
    }

    /// Absolute offset of sample `(row, col)`, if representable.
    pub fn sample_offset(&self, row: usize, col: usize) -> Option<usize> {
        self.row_start(row)?
            .checked_add(col.checked_mul(self.pixel_stride)?)
    }

    /// Byte at absolute `offset`, or `None` once `offset >= limit`.
    pub fn read_at(&self, offset: usize) -> Option<u8> {
        if offset >= self.limit {
            return None;
        }
        self.data.get(offset).copied()
    }

    /// `len` contiguous bytes starting at absolute `offset`, only when the
    /// whole span lies inside the valid window.
    pub fn read_span(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.limit {
            return None;
        }
        self.data.get(offset..end)
    }

    /// Sample at logical `(row, col)` using this plane's strides.
    pub fn sample(&self, row: usize, col: usize) -> Option<u8> {
        self.read_at(self.sample_offset(row, col)?)
    }
}
