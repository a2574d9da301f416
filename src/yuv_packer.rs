//! Planar YUV 4:2:0 → NV21 packing.
//!
//! Output layout (`W*H*3/2` bytes):
//!   - `W*H` luma bytes, row-major.
//!   - one `(V, U)` pair per 2×2 luma block, row-major over the chroma grid.
//!
//! The packer is total: truncated planes degrade instead of failing. A luma row
//! that runs past its plane limit repeats the last sample read; a chroma row
//! that runs past either limit simply stops, leaving the rest of that row's
//! pairs zeroed.

use anyhow::{bail, Result};

use crate::plane::PlaneDescriptor;

/// A camera frame as three strided planes: luma at full resolution, chroma
/// A (U) and chroma B (V) at half resolution in both axes.
#[derive(Debug, Clone, Copy)]
pub struct PlanarYuvFrame<'a> {
    width: usize,
    height: usize,
    luma: PlaneDescriptor<'a>,
    chroma_a: PlaneDescriptor<'a>,
    chroma_b: PlaneDescriptor<'a>,
}

impl<'a> PlanarYuvFrame<'a> {
    pub fn new(
        width: usize,
        height: usize,
        luma: PlaneDescriptor<'a>,
        chroma_a: PlaneDescriptor<'a>,
        chroma_b: PlaneDescriptor<'a>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("frame dimensions must be non-zero, got {}x{}", width, height);
        }
        if height % 2 != 0 {
            bail!("frame height must be even for 4:2:0 chroma, got {}", height);
        }
        if width.checked_mul(height).is_none() {
            bail!("frame dimensions {}x{} overflow", width, height);
        }

        Ok(Self {
            width,
            height,
            luma,
            chroma_a,
            chroma_b,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// NV21 buffer produced by [`pack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedChromaFrame {
    width: usize,
    height: usize,
    bytes: Vec<u8>,
}

impl PackedChromaFrame {
    /// Expected buffer length for a `width × height` frame.
    pub fn packed_len(width: usize, height: usize) -> usize {
        let luma = width * height;
        luma + luma / 2
    }

    /// Wrap an existing NV21 buffer, checking its length.
    pub fn from_bytes(width: usize, height: usize, bytes: Vec<u8>) -> Result<Self> {
        let expected = Self::packed_len(width, height);
        if bytes.len() != expected {
            bail!(
                "packed {}x{} frame must be {} bytes, got {}",
                width,
                height,
                expected,
                bytes.len()
            );
        }
        Ok(Self {
            width,
            height,
            bytes,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn luma(&self) -> &[u8] {
        &self.bytes[..self.width * self.height]
    }

    /// Interleaved `(V, U)` pairs.
    pub fn chroma(&self) -> &[u8] {
        &self.bytes[self.width * self.height..]
    }
}

pub fn pack(frame: &PlanarYuvFrame<'_>) -> PackedChromaFrame {
    let width = frame.width;
    let height = frame.height;
    let mut bytes = vec![0_u8; PackedChromaFrame::packed_len(width, height)];

    pack_luma(frame, &mut bytes[..width * height]);
    pack_chroma(frame, &mut bytes[width * height..]);

    PackedChromaFrame {
        width,
        height,
        bytes,
    }
}

fn pack_luma(frame: &PlanarYuvFrame<'_>, out: &mut [u8]) {
    let width = frame.width;
    let plane = &frame.luma;

    for row in 0..frame.height {
        let dst_start = row * width;
        let dst = dst_start..dst_start + width;

        if plane.pixel_stride() == 1 {
            if let Some(span) = plane
                .row_start(row)
                .and_then(|start| plane.read_span(start, width))
            {
                out[dst].copy_from_slice(span);
                continue;
            }
        }

        // Seed with the previous output byte so a row with no readable
        // samples still repeats the nearest valid value.
        let mut last = if dst_start > 0 { out[dst_start - 1] } else { 0 };
        let mut col = 0;
        while col < width {
            let Some(sample) = plane.sample(row, col) else {
                break;
            };
            out[dst_start + col] = sample;
            last = sample;
            col += 1;
        }
        out[dst_start + col..dst_start + width].fill(last);
    }
}

fn pack_chroma(frame: &PlanarYuvFrame<'_>, out: &mut [u8]) {
    let chroma_rows = frame.height / 2;
    let chroma_cols = frame.width / 2;

    for row in 0..chroma_rows {
        for col in 0..chroma_cols {
            let (Some(v), Some(u)) = (frame.chroma_b.sample(row, col), frame.chroma_a.sample(row, col))
            else {
                break;
            };
            let offset = 2 * (row * chroma_cols + col);
            out[offset] = v;
            out[offset + 1] = u;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_frame<'a>(
        width: usize,
        height: usize,
        y: &'a [u8],
        u: &'a [u8],
        v: &'a [u8],
    ) -> PlanarYuvFrame<'a> {
        PlanarYuvFrame::new(
            width,
            height,
            PlaneDescriptor::new(y, width, 1),
            PlaneDescriptor::new(u, width / 2, 1),
            PlaneDescriptor::new(v, width / 2, 1),
        )
        .expect("valid frame")
    }

    #[test]
    fn constant_planes_pack_to_constant_luma_and_vu_pairs() {
        let y = vec![50_u8; 8 * 4];
        let u = vec![90_u8; 4 * 2];
        let v = vec![200_u8; 4 * 2];

        let packed = pack(&tight_frame(8, 4, &y, &u, &v));

        assert_eq!(packed.len(), 8 * 4 * 3 / 2);
        assert!(packed.luma().iter().all(|&b| b == 50));
        for pair in packed.chroma().chunks_exact(2) {
            assert_eq!(pair, [200, 90]);
        }
    }

    #[test]
    fn tightly_packed_luma_is_copied_verbatim() {
        let y: Vec<u8> = (0..24).collect();
        let u = vec![1_u8; 6];
        let v = vec![2_u8; 6];

        let packed = pack(&tight_frame(6, 4, &y, &u, &v));

        assert_eq!(packed.luma(), y.as_slice());
    }

    #[test]
    fn padded_rows_and_pixel_stride_are_skipped() {
        // 4x2 luma with row stride 6 (2 bytes of padding per row).
        let y = [1, 2, 3, 4, 0xEE, 0xEE, 5, 6, 7, 8, 0xEE, 0xEE];
        // Semi-planar style chroma: pixel stride 2, interleaved garbage between samples.
        let u = [10, 0xEE, 11, 0xEE];
        let v = [20, 0xEE, 21, 0xEE];
        let frame = PlanarYuvFrame::new(
            4,
            2,
            PlaneDescriptor::new(&y, 6, 1),
            PlaneDescriptor::new(&u, 4, 2),
            PlaneDescriptor::new(&v, 4, 2),
        )
        .expect("valid frame");

        let packed = pack(&frame);

        assert_eq!(packed.luma(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(packed.chroma(), [20, 10, 21, 11]);
    }

    #[test]
    fn truncated_luma_row_repeats_last_valid_sample() {
        // Second row is cut after two samples.
        let y = [1, 2, 3, 4, 5, 6, 0, 0];
        let y_plane = PlaneDescriptor::new(&y, 4, 1).with_window(0, 6);
        let u = [9_u8; 2];
        let v = [8_u8; 2];
        let frame = PlanarYuvFrame::new(
            4,
            2,
            y_plane,
            PlaneDescriptor::new(&u, 2, 1),
            PlaneDescriptor::new(&v, 2, 1),
        )
        .expect("valid frame");

        let packed = pack(&frame);

        assert_eq!(packed.len(), 12);
        assert_eq!(packed.luma(), [1, 2, 3, 4, 5, 6, 6, 6]);
    }

    #[test]
    fn luma_row_with_no_readable_samples_repeats_previous_row_tail() {
        let y = [1, 2, 3, 4];
        let frame = PlanarYuvFrame::new(
            4,
            2,
            PlaneDescriptor::new(&y, 4, 2),
            PlaneDescriptor::new(&[0_u8; 2], 2, 1),
            PlaneDescriptor::new(&[0_u8; 2], 2, 1),
        )
        .expect("valid frame");

        let packed = pack(&frame);

        // Row 0 reads offsets 0 and 2, then stops; row 1 starts past the limit.
        assert_eq!(packed.luma(), [1, 3, 3, 3, 3, 3, 3, 3]);
    }

    #[test]
    fn truncated_chroma_row_stops_without_padding() {
        let y = vec![0_u8; 8 * 2];
        let u = [10, 11, 12, 13];
        // V plane limit cuts the only chroma row after two samples.
        let v = [20, 21, 22, 23];
        let frame = PlanarYuvFrame::new(
            8,
            2,
            PlaneDescriptor::new(&y, 8, 1),
            PlaneDescriptor::new(&u, 4, 1),
            PlaneDescriptor::new(&v, 4, 1).with_window(0, 2),
        )
        .expect("valid frame");

        let packed = pack(&frame);

        assert_eq!(packed.len(), 24);
        assert_eq!(packed.chroma(), [20, 10, 21, 11, 0, 0, 0, 0]);
    }

    #[test]
    fn truncated_chroma_keeps_later_rows_at_their_own_offsets() {
        let y = vec![0_u8; 4 * 4];
        // Row stride 3 with limit 4: row 0 has two valid samples, row 1 only one.
        let u = [1, 2, 0, 3];
        let v = [5, 6, 0, 7, 8, 0];
        let frame = PlanarYuvFrame::new(
            4,
            4,
            PlaneDescriptor::new(&y, 4, 1),
            PlaneDescriptor::new(&u, 3, 1),
            PlaneDescriptor::new(&v, 3, 1),
        )
        .expect("valid frame");

        let packed = pack(&frame);

        assert_eq!(packed.chroma(), [5, 1, 6, 2, 7, 3, 0, 0]);
    }

    #[test]
    fn packing_720p_frame_yields_exact_nv21_length() {
        let y = vec![16_u8; 1280 * 720];
        let u = vec![128_u8; 640 * 360];
        let v = vec![128_u8; 640 * 360];

        let packed = pack(&tight_frame(1280, 720, &y, &u, &v));

        assert_eq!(packed.len(), 1_382_400);
    }

    #[test]
    fn odd_height_is_rejected() {
        let y = [0_u8; 6];
        let result = PlanarYuvFrame::new(
            2,
            3,
            PlaneDescriptor::new(&y, 2, 1),
            PlaneDescriptor::new(&y, 1, 1),
            PlaneDescriptor::new(&y, 1, 1),
        );

        assert!(result.is_err());
    }

    #[test]
    fn from_bytes_checks_length() {
        assert!(PackedChromaFrame::from_bytes(4, 2, vec![0; 12]).is_ok());
        assert!(PackedChromaFrame::from_bytes(4, 2, vec![0; 11]).is_err());
    }
}
