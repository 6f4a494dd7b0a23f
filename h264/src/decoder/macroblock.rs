//! Decoded macroblock storage

use crate::decoder::neighbour::MbNeighbours;
use crate::decoder::picture::Image;
use crate::types::{Intra4x4Mode, MotionVector, PcmSamples};

/// Reconstruction progress of one macroblock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeState {
    /// Not yet attempted, or attempted and failed.
    NotAttempted,

    /// Successfully reconstructed from bitstream syntax.
    Decoded,

    /// Populated by error concealment.
    Concealed,
}

/// Per-macroblock persistent state, one entry per macroblock position in the
/// picture's macroblock array.
///
/// Holds the cross-macroblock context later macroblocks read back during
/// reconstruction (motion data, intra modes, coefficient counts) plus the
/// metadata the external deblocking filter consumes (QP, intra flag, filter
/// disable flag).
pub struct MacroblockStorage {
    /// The slice this macroblock was reconstructed in, or `None` until it
    /// succeeds. Neighbour availability compares this against the current
    /// slice id, so a failed or pending macroblock is never available.
    pub slice_id: Option<u32>,

    pub state: DecodeState,

    /// Guards the image write: once set, further writes of this macroblock
    /// are no-ops. Kept separate from `state` so "was this reconstructed"
    /// and "has it been written to the image" stay independent facts.
    pub written: bool,

    pub is_intra: bool,

    /// Luma quantization parameter in force for this macroblock.
    pub qp: u8,

    /// Set when the external deblocking filter must skip this macroblock.
    pub disable_deblocking: bool,

    /// Macroblock-level neighbours, resolved once at picture setup.
    pub neighbours: MbNeighbours,

    /// Resolved per-block intra 4x4 modes; `None` for every block of
    /// macroblocks that are not Intra_4x4 coded.
    pub intra_modes: [Option<Intra4x4Mode>; 16],

    /// Total-coefficient counts for all 24 blocks (luma `0..16`, Cb
    /// `16..20`, Cr `20..24`), read back by the CAVLC context derivation of
    /// subsequent macroblocks (an external collaborator).
    pub total_coeff: [u8; 24],

    /// Final motion vector of each 4x4 luma block.
    pub mv: [MotionVector; 16],

    /// Reference index of each 4x4 luma block; `-1` marks intra blocks and
    /// blocks without motion data.
    pub ref_idx: [i8; 16],
}

impl Default for MacroblockStorage {
    fn default() -> Self {
        Self {
            slice_id: None,
            state: DecodeState::NotAttempted,
            written: false,
            is_intra: false,
            qp: 0,
            disable_deblocking: false,
            neighbours: MbNeighbours::default(),
            intra_modes: [None; 16],
            total_coeff: [0; 24],
            mv: [MotionVector::zero(); 16],
            ref_idx: [-1; 16],
        }
    }
}

impl MacroblockStorage {
    /// Reset the per-picture state, keeping the resolved neighbours.
    pub fn reset(&mut self) {
        let neighbours = self.neighbours;
        *self = Self::default();
        self.neighbours = neighbours;
    }
}

/// Working sample storage for one macroblock's reconstruction: a 16x16 luma
/// block and two 8x8 chroma blocks, all row-major.
pub struct MacroblockBuffer {
    pub luma: [u8; 256],
    pub chroma_b: [u8; 64],
    pub chroma_r: [u8; 64],
}

impl MacroblockBuffer {
    pub fn new() -> Self {
        Self {
            luma: [0; 256],
            chroma_b: [0; 64],
            chroma_r: [0; 64],
        }
    }

    /// Load raw I_PCM samples, which bypass prediction and residual
    /// processing entirely.
    pub fn load_pcm(&mut self, samples: &PcmSamples) {
        self.luma.copy_from_slice(&samples.luma);
        self.chroma_b.copy_from_slice(&samples.chroma_b);
        self.chroma_r.copy_from_slice(&samples.chroma_r);
    }
}

impl Default for MacroblockBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Scatter a square block into a pixel data array.
///
/// Pixel data and block data are assumed to be in row-major
/// (x + y*width) order.
fn write_plane(
    pixel_data: &mut [u8],
    samples_per_row: usize,
    pos: (usize, usize),
    size: usize,
    block_data: &[u8],
) {
    for v in 0..size {
        let row = pos.0 + (pos.1 + v) * samples_per_row;
        pixel_data[row..row + size].copy_from_slice(&block_data[v * size..v * size + size]);
    }
}

/// Copy reconstructed macroblock samples back into the picture.
///
/// `pos` is the macroblock position in macroblock units.
pub fn write_macroblock(image: &mut Image, pos: (usize, usize), buffer: &MacroblockBuffer) {
    let luma_samples_per_row = image.luma_samples_per_row();
    write_plane(
        image.as_luma_mut(),
        luma_samples_per_row,
        (pos.0 * 16, pos.1 * 16),
        16,
        &buffer.luma,
    );

    let chroma_samples_per_row = image.chroma_samples_per_row();
    write_plane(
        image.as_chroma_b_mut(),
        chroma_samples_per_row,
        (pos.0 * 8, pos.1 * 8),
        8,
        &buffer.chroma_b,
    );
    write_plane(
        image.as_chroma_r_mut(),
        chroma_samples_per_row,
        (pos.0 * 8, pos.1 * 8),
        8,
        &buffer.chroma_r,
    );
}

#[cfg(test)]
mod tests {
    use crate::decoder::macroblock::{write_macroblock, MacroblockBuffer};
    use crate::decoder::picture::Image;

    #[test]
    fn macroblock_write_lands_at_position() {
        let mut image = Image::new(2, 2).unwrap();
        let mut buffer = MacroblockBuffer::new();
        buffer.luma = [9; 256];
        buffer.chroma_b = [7; 64];
        buffer.chroma_r = [5; 64];

        write_macroblock(&mut image, (1, 0), &buffer);

        let luma_row = image.luma_samples_per_row();
        assert_eq!(image.as_luma()[15], 0);
        assert_eq!(image.as_luma()[16], 9);
        assert_eq!(image.as_luma()[15 * luma_row + 31], 9);
        assert_eq!(image.as_luma()[16 * luma_row + 16], 0);

        let chroma_row = image.chroma_samples_per_row();
        assert_eq!(image.as_chroma_b()[7], 0);
        assert_eq!(image.as_chroma_b()[8], 7);
        assert_eq!(image.as_chroma_r()[7 * chroma_row + 15], 5);
    }
}
