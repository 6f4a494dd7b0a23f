//! H.264 reconstruction core

use crate::decoder::conceal;
use crate::decoder::cpu::inter::{predict_inter, PartitionPrediction};
use crate::decoder::cpu::intra::{
    derive_4x4_mode, predict_16x16, predict_4x4, predict_chroma, BlockNeighbours,
    ChromaNeighbourSamples, MbNeighbourSamples,
};
use crate::decoder::cpu::mv_pred::{self, NeighbourMotion};
use crate::decoder::cpu::transform::{
    chroma_dc_transform, chroma_qp, luma_dc_transform, transform_add,
};
use crate::decoder::macroblock::{
    write_macroblock, DecodeState, MacroblockBuffer, MacroblockStorage,
};
use crate::decoder::neighbour::{is_available, neighbour_block, resolve_neighbours, NeighbourDir, NeighbourKind};
use crate::decoder::picture::Image;
use crate::decoder::types::{DecoderOption, SliceParameters, SliceType};
use crate::error::{Error, Result};
use crate::types::{
    ChromaPattern, CodedBlockPattern, Intra4x4Mode, Intra4x4ModeSelect, IntraChromaMode,
    MacroblockLayer, MotionVector, Prediction, Residual, ResidualBlock, SubMacroblock,
};

/// All state necessary to reconstruct the macroblocks of one picture.
///
/// The orchestrator owns the output image and the per-macroblock state array
/// for the duration of a picture's decode; macroblocks must be submitted in
/// raster order, since intra prediction reads the already-written samples of
/// its left and above neighbours. A failed macroblock stays `NotAttempted`
/// and the error propagates to the caller, which may invoke
/// [`H264State::conceal_picture`] as the recovery path.
pub struct H264State {
    decoder_options: DecoderOption,

    width_in_mbs: usize,
    height_in_mbs: usize,

    /// One entry per macroblock position, with neighbours resolved at
    /// construction time.
    mbs: Vec<MacroblockStorage>,

    /// The picture being reconstructed.
    image: Image,

    /// Parameters of the slice currently being fed, if any.
    slice: Option<SliceParameters>,

    /// The luma QP in force, updated by each macroblock's QP delta.
    running_qp: u8,

    /// Set when whole-picture concealment disables deblocking everywhere.
    deblocking_disabled: bool,
}

impl H264State {
    /// Construct a reconstruction state for pictures of the given size in
    /// macroblocks. Yields `None` for an empty picture.
    pub fn new(
        width_in_mbs: usize,
        height_in_mbs: usize,
        decoder_options: DecoderOption,
    ) -> Option<Self> {
        let image = Image::new(width_in_mbs, height_in_mbs)?;

        let total = width_in_mbs * height_in_mbs;
        let mut mbs = Vec::with_capacity(total);
        for addr in 0..total {
            let mut mb = MacroblockStorage::default();
            mb.neighbours = resolve_neighbours(width_in_mbs, addr);
            mbs.push(mb);
        }

        Some(Self {
            decoder_options,
            width_in_mbs,
            height_in_mbs,
            mbs,
            image,
            slice: None,
            running_qp: 0,
            deblocking_disabled: false,
        })
    }

    pub fn width_in_mbs(&self) -> usize {
        self.width_in_mbs
    }

    pub fn height_in_mbs(&self) -> usize {
        self.height_in_mbs
    }

    /// The picture under reconstruction.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Per-macroblock metadata for the external deblocking filter.
    pub fn macroblock(&self, addr: usize) -> Option<&MacroblockStorage> {
        self.mbs.get(addr)
    }

    /// Whether whole-picture concealment disabled deblocking for this
    /// picture.
    pub fn deblocking_disabled(&self) -> bool {
        self.deblocking_disabled
    }

    /// Reset all per-picture state ahead of the next picture's macroblocks.
    ///
    /// Sample data of the previous picture stays in the image buffer; every
    /// macroblock is rewritten or concealed before the picture is complete.
    pub fn begin_picture(&mut self) {
        for mb in self.mbs.iter_mut() {
            mb.reset();
        }
        self.slice = None;
        self.running_qp = 0;
        self.deblocking_disabled = false;
    }

    /// Establish the slice context for the macroblocks that follow.
    pub fn begin_slice(&mut self, params: SliceParameters) {
        self.running_qp = params.qp.min(51);
        self.slice = Some(params);
    }

    /// Reconstruct one macroblock from its parsed syntax.
    ///
    /// `dpb` is the decoded picture buffer the reference indices select
    /// from. On success the macroblock's samples are in the image and its
    /// storage is updated; on failure nothing is recorded and the error
    /// propagates. Submitting an already-written macroblock again leaves
    /// the image untouched.
    pub fn decode_macroblock(
        &mut self,
        addr: usize,
        layer: &MacroblockLayer,
        dpb: &[Image],
    ) -> Result<()> {
        let slice = self.slice.ok_or(Error::InvalidSemantics)?;
        if addr >= self.mbs.len() {
            return Err(Error::BadMacroblockAddress);
        }

        if layer.prediction.is_inter() && matches!(slice.slice_type, SliceType::I) {
            return Err(Error::InvalidSemantics);
        }

        let qp = match &layer.prediction {
            Prediction::Skip => self.running_qp,
            Prediction::Pcm(_) => 0,
            _ => (self.running_qp as i32 + layer.qp_delta).rem_euclid(52) as u8,
        };

        let mut buffer = MacroblockBuffer::new();
        let mut intra_modes = [None; 16];
        let mut mv = [MotionVector::zero(); 16];
        let mut ref_idx = [-1i8; 16];
        let mut total_coeff = [0u8; 24];

        match &layer.prediction {
            Prediction::Pcm(samples) => {
                buffer.load_pcm(samples);
                // Downstream CAVLC context treats every I_PCM block as
                // fully coded.
                total_coeff = [16; 24];
            }

            prediction if prediction.is_inter() => {
                let resolved = self.resolve_motion(addr, slice.slice_id, prediction)?;
                predict_inter(
                    &resolved.partitions,
                    dpb,
                    (addr % self.width_in_mbs * 16, addr / self.width_in_mbs * 16),
                    &mut buffer,
                )?;
                mv = resolved.mv;
                ref_idx = resolved.ref_idx;

                apply_luma_residual(
                    &mut buffer,
                    &layer.residual,
                    &layer.coded_block_pattern,
                    qp,
                    None,
                );
                collect_luma_totals(&mut total_coeff, &layer.residual);
            }

            Prediction::Intra4x4 { modes, chroma_mode } => {
                self.decode_intra4x4(
                    addr,
                    slice.slice_id,
                    modes,
                    &layer.residual,
                    &layer.coded_block_pattern,
                    qp,
                    &mut buffer,
                    &mut intra_modes,
                )?;
                self.predict_intra_chroma(addr, slice.slice_id, *chroma_mode, &mut buffer)?;
                collect_luma_totals(&mut total_coeff, &layer.residual);
            }

            Prediction::Intra16x16 { mode, chroma_mode } => {
                let n = self.luma_mb_neighbours(addr, slice.slice_id);
                predict_16x16(*mode, &n, &mut buffer.luma)?;

                let dc = luma_dc_transform(&layer.residual.luma_dc, qp);
                apply_luma_residual(
                    &mut buffer,
                    &layer.residual,
                    &layer.coded_block_pattern,
                    qp,
                    Some(&dc),
                );
                self.predict_intra_chroma(addr, slice.slice_id, *chroma_mode, &mut buffer)?;
                collect_luma_totals(&mut total_coeff, &layer.residual);
            }

            // Every variant is covered above; the guard arm keeps the
            // match non-exhaustive in the compiler's eyes.
            _ => return Err(Error::InvalidSemantics),
        }

        // Chroma residual applies to every non-PCM macroblock type.
        if !matches!(layer.prediction, Prediction::Pcm(_)) {
            let qp_c = chroma_qp(qp, slice.chroma_qp_index_offset);
            apply_chroma_residual(
                &mut buffer,
                &layer.residual,
                &layer.coded_block_pattern,
                qp_c,
            );
            collect_chroma_totals(&mut total_coeff, &layer.residual);
        }

        // All fallible work is done; commit samples and state.
        let pos = (addr % self.width_in_mbs, addr / self.width_in_mbs);
        let mb = &mut self.mbs[addr];
        if !mb.written {
            write_macroblock(&mut self.image, pos, &buffer);
            mb.written = true;
        }

        mb.state = DecodeState::Decoded;
        mb.slice_id = Some(slice.slice_id);
        mb.is_intra = layer.prediction.is_intra();
        mb.qp = qp;
        mb.intra_modes = intra_modes;
        mb.total_coeff = total_coeff;
        mb.mv = mv;
        mb.ref_idx = ref_idx;

        self.running_qp = qp;

        Ok(())
    }

    /// Conceal every macroblock that failed to decode, guaranteeing a fully
    /// populated output image.
    pub fn conceal_picture(&mut self, slice_type: SliceType, dpb: &[Image]) {
        let whole_picture = conceal::conceal_picture(
            &mut self.image,
            &mut self.mbs,
            self.width_in_mbs,
            self.height_in_mbs,
            slice_type,
            self.decoder_options,
            dpb,
        );

        if whole_picture {
            self.deblocking_disabled = true;
        }
    }

    /// Fetch the motion data of the neighbouring 4x4 block in the given
    /// direction, reading from the partially-filled local arrays for
    /// neighbours inside the current macroblock.
    fn motion_candidate(
        &self,
        addr: usize,
        slice_id: u32,
        block: usize,
        dir: NeighbourDir,
        local_mv: &[MotionVector; 16],
        local_ref: &[i8; 16],
    ) -> Option<NeighbourMotion> {
        let descriptor = neighbour_block(block, dir);
        match descriptor.mb {
            NeighbourKind::Current => Some(NeighbourMotion {
                mv: local_mv[descriptor.block as usize],
                ref_idx: local_ref[descriptor.block as usize],
            }),
            NeighbourKind::Unavailable => None,
            kind => {
                let index = self.mbs[addr].neighbours.index_of(kind, addr);
                if !is_available(&self.mbs, slice_id, index) {
                    return None;
                }
                let neighbour = &self.mbs[index?];
                Some(NeighbourMotion {
                    mv: neighbour.mv[descriptor.block as usize],
                    ref_idx: neighbour.ref_idx[descriptor.block as usize],
                })
            }
        }
    }

    /// The A/B/C candidate set of a partition whose top-left 4x4 block is
    /// `origin` and whose top-right 4x4 block is `top_right`, with the
    /// above-left substitution when above-right is unavailable.
    fn partition_candidates(
        &self,
        addr: usize,
        slice_id: u32,
        origin: usize,
        top_right: usize,
        local_mv: &[MotionVector; 16],
        local_ref: &[i8; 16],
    ) -> (
        Option<NeighbourMotion>,
        Option<NeighbourMotion>,
        Option<NeighbourMotion>,
    ) {
        let a = self.motion_candidate(addr, slice_id, origin, NeighbourDir::Left, local_mv, local_ref);
        let b = self.motion_candidate(addr, slice_id, origin, NeighbourDir::Above, local_mv, local_ref);
        let c = self
            .motion_candidate(
                addr,
                slice_id,
                top_right,
                NeighbourDir::AboveRight,
                local_mv,
                local_ref,
            )
            .or_else(|| {
                self.motion_candidate(
                    addr,
                    slice_id,
                    origin,
                    NeighbourDir::AboveLeft,
                    local_mv,
                    local_ref,
                )
            });
        (a, b, c)
    }

    /// Resolve every partition's final motion vector and reference index.
    fn resolve_motion(
        &self,
        addr: usize,
        slice_id: u32,
        prediction: &Prediction,
    ) -> Result<ResolvedMotion> {
        let mut resolved = ResolvedMotion::default();

        match prediction {
            Prediction::Skip => {
                let (a, b, c) =
                    self.partition_candidates(addr, slice_id, 0, 3, &resolved.mv, &resolved.ref_idx);
                let vector = mv_pred::skip_vector(a, b, c);
                resolved.push(0, 0, 16, 16, vector, 0);
            }

            Prediction::Inter16x16(part) => {
                let (a, b, c) =
                    self.partition_candidates(addr, slice_id, 0, 3, &resolved.mv, &resolved.ref_idx);
                let predictor = mv_pred::predict(a, b, c, part.ref_idx);
                let vector = mv_pred::resolve(predictor, part.mvd)?;
                resolved.push(0, 0, 16, 16, vector, part.ref_idx);
            }

            Prediction::Inter16x8(parts) => {
                for (index, part) in parts.iter().enumerate() {
                    let origin = index * 8;
                    let (a, b, c) = self.partition_candidates(
                        addr,
                        slice_id,
                        origin,
                        origin + 3,
                        &resolved.mv,
                        &resolved.ref_idx,
                    );
                    let predictor = mv_pred::predict_16x8(index, a, b, c, part.ref_idx);
                    let vector = mv_pred::resolve(predictor, part.mvd)?;
                    resolved.push(0, index * 8, 16, 8, vector, part.ref_idx);
                }
            }

            Prediction::Inter8x16(parts) => {
                for (index, part) in parts.iter().enumerate() {
                    let origin = index * 2;
                    let (a, b, c) = self.partition_candidates(
                        addr,
                        slice_id,
                        origin,
                        origin + 1,
                        &resolved.mv,
                        &resolved.ref_idx,
                    );
                    let predictor = mv_pred::predict_8x16(index, a, b, c, part.ref_idx);
                    let vector = mv_pred::resolve(predictor, part.mvd)?;
                    resolved.push(index * 8, 0, 8, 16, vector, part.ref_idx);
                }
            }

            Prediction::Inter8x8(subs) => {
                self.resolve_sub_macroblocks(addr, slice_id, subs, &mut resolved)?;
            }

            _ => return Err(Error::InvalidSemantics),
        }

        Ok(resolved)
    }

    fn resolve_sub_macroblocks(
        &self,
        addr: usize,
        slice_id: u32,
        subs: &[SubMacroblock; 4],
        resolved: &mut ResolvedMotion,
    ) -> Result<()> {
        for (sub_index, sub) in subs.iter().enumerate() {
            let base_x = (sub_index % 2) * 8;
            let base_y = (sub_index / 2) * 8;
            let (width, height) = sub.mode.partition_size();

            for part in 0..sub.mode.partition_count() {
                let (dx, dy) = match sub.mode.partition_count() {
                    1 => (0, 0),
                    2 => {
                        if width == 8 {
                            (0, part * 4)
                        } else {
                            (part * 4, 0)
                        }
                    }
                    _ => ((part % 2) * 4, (part / 2) * 4),
                };

                let x = base_x + dx;
                let y = base_y + dy;
                let origin = x / 4 + (y / 4) * 4;
                let top_right = (x + width - 4) / 4 + (y / 4) * 4;

                let (a, b, c) = self.partition_candidates(
                    addr,
                    slice_id,
                    origin,
                    top_right,
                    &resolved.mv,
                    &resolved.ref_idx,
                );
                let predictor = mv_pred::predict(a, b, c, sub.ref_idx);
                let vector = mv_pred::resolve(predictor, sub.mvd[part])?;
                resolved.push(x, y, width, height, vector, sub.ref_idx);
            }
        }

        Ok(())
    }

    /// Neighbouring reconstructed samples of the full luma macroblock, read
    /// from the output image.
    fn luma_mb_neighbours(&self, addr: usize, slice_id: u32) -> MbNeighbourSamples {
        let storage = &self.mbs[addr];
        let has_above = is_available(&self.mbs, slice_id, storage.neighbours.b);
        let has_left = is_available(&self.mbs, slice_id, storage.neighbours.a);
        let has_above_left = is_available(&self.mbs, slice_id, storage.neighbours.d);

        let mb_x = addr % self.width_in_mbs * 16;
        let mb_y = addr / self.width_in_mbs * 16;
        let luma = self.image.as_luma();
        let stride = self.image.luma_samples_per_row();

        let mut above = [0u8; 16];
        if has_above {
            let row = mb_x + (mb_y - 1) * stride;
            above.copy_from_slice(&luma[row..row + 16]);
        }

        let mut left = [0u8; 16];
        if has_left {
            for (i, sample) in left.iter_mut().enumerate() {
                *sample = luma[(mb_x - 1) + (mb_y + i) * stride];
            }
        }

        let above_left = if has_above_left {
            luma[(mb_x - 1) + (mb_y - 1) * stride]
        } else {
            0
        };

        MbNeighbourSamples {
            above,
            left,
            above_left,
            has_above,
            has_left,
            has_above_left,
        }
    }

    /// Neighbouring reconstructed samples of one chroma component block.
    fn chroma_mb_neighbours(
        &self,
        addr: usize,
        slice_id: u32,
        component: usize,
    ) -> ChromaNeighbourSamples {
        let storage = &self.mbs[addr];
        let has_above = is_available(&self.mbs, slice_id, storage.neighbours.b);
        let has_left = is_available(&self.mbs, slice_id, storage.neighbours.a);
        let has_above_left = is_available(&self.mbs, slice_id, storage.neighbours.d);

        let mb_x = addr % self.width_in_mbs * 8;
        let mb_y = addr / self.width_in_mbs * 8;
        let plane = if component == 0 {
            self.image.as_chroma_b()
        } else {
            self.image.as_chroma_r()
        };
        let stride = self.image.chroma_samples_per_row();

        let mut above = [0u8; 8];
        if has_above {
            let row = mb_x + (mb_y - 1) * stride;
            above.copy_from_slice(&plane[row..row + 8]);
        }

        let mut left = [0u8; 8];
        if has_left {
            for (i, sample) in left.iter_mut().enumerate() {
                *sample = plane[(mb_x - 1) + (mb_y + i) * stride];
            }
        }

        let above_left = if has_above_left {
            plane[(mb_x - 1) + (mb_y - 1) * stride]
        } else {
            0
        };

        ChromaNeighbourSamples {
            above,
            left,
            above_left,
            has_above,
            has_left,
            has_above_left,
        }
    }

    fn predict_intra_chroma(
        &self,
        addr: usize,
        slice_id: u32,
        mode: IntraChromaMode,
        buffer: &mut MacroblockBuffer,
    ) -> Result<()> {
        let n = self.chroma_mb_neighbours(addr, slice_id, 0);
        predict_chroma(mode, &n, &mut buffer.chroma_b)?;
        let n = self.chroma_mb_neighbours(addr, slice_id, 1);
        predict_chroma(mode, &n, &mut buffer.chroma_r)?;
        Ok(())
    }

    /// Neighbouring reconstructed samples of one 4x4 luma block: from the
    /// working buffer for in-macroblock neighbours, from the output image
    /// otherwise.
    fn block_neighbours(
        &self,
        addr: usize,
        slice_id: u32,
        block: usize,
        buffer: &MacroblockBuffer,
    ) -> BlockNeighbours {
        let storage = &self.mbs[addr];
        let mb_x = (addr % self.width_in_mbs * 16) as i32;
        let mb_y = (addr / self.width_in_mbs * 16) as i32;
        let bx = ((block % 4) * 4) as i32;
        let by = ((block / 4) * 4) as i32;
        let luma = self.image.as_luma();
        let stride = self.image.luma_samples_per_row() as i32;

        let available = |kind: NeighbourKind| match kind {
            NeighbourKind::Current => true,
            NeighbourKind::Unavailable => false,
            kind => is_available(
                &self.mbs,
                slice_id,
                storage.neighbours.index_of(kind, addr),
            ),
        };

        // Sample at macroblock-relative luma coordinates; in-macroblock
        // positions read the working buffer, the rest the image.
        let sample = |x: i32, y: i32, kind: NeighbourKind| -> u8 {
            if kind == NeighbourKind::Current {
                buffer.luma[(x + y * 16) as usize]
            } else {
                luma[((mb_x + x) + (mb_y + y) * stride) as usize]
            }
        };

        let left_desc = neighbour_block(block, NeighbourDir::Left);
        let has_left = available(left_desc.mb);
        let mut left = [0u8; 4];
        if has_left {
            for (i, value) in left.iter_mut().enumerate() {
                *value = sample(bx - 1, by + i as i32, left_desc.mb);
            }
        }

        let above_desc = neighbour_block(block, NeighbourDir::Above);
        let has_above = available(above_desc.mb);
        let mut above = [0u8; 8];
        if has_above {
            for i in 0..4 {
                above[i] = sample(bx + i as i32, by - 1, above_desc.mb);
            }

            let right_desc = neighbour_block(block, NeighbourDir::AboveRight);
            if available(right_desc.mb) {
                for i in 0..4 {
                    above[4 + i] = sample(bx + 4 + i as i32, by - 1, right_desc.mb);
                }
            } else {
                // Normative substitution: replicate the last above sample.
                for i in 0..4 {
                    above[4 + i] = above[3];
                }
            }
        }

        let corner_desc = neighbour_block(block, NeighbourDir::AboveLeft);
        let has_above_left = available(corner_desc.mb);
        let above_left = if has_above_left {
            sample(bx - 1, by - 1, corner_desc.mb)
        } else {
            0
        };

        BlockNeighbours {
            above,
            left,
            above_left,
            has_above,
            has_left,
            has_above_left,
        }
    }

    /// The intra mode of the neighbouring 4x4 block for most-probable-mode
    /// derivation; `None` when the neighbour is unavailable or not
    /// Intra_4x4 coded.
    fn neighbour_intra_mode(
        &self,
        addr: usize,
        slice_id: u32,
        block: usize,
        dir: NeighbourDir,
        local_modes: &[Option<Intra4x4Mode>; 16],
    ) -> Option<Intra4x4Mode> {
        let descriptor = neighbour_block(block, dir);
        match descriptor.mb {
            NeighbourKind::Current => local_modes[descriptor.block as usize],
            NeighbourKind::Unavailable => None,
            kind => {
                let index = self.mbs[addr].neighbours.index_of(kind, addr);
                if !is_available(&self.mbs, slice_id, index) {
                    return None;
                }
                self.mbs[index?].intra_modes[descriptor.block as usize]
            }
        }
    }

    /// Reconstruct the sixteen 4x4 luma blocks of an Intra_4x4 macroblock
    /// in raster order, applying each block's residual before the next
    /// block's prediction reads it.
    #[allow(clippy::too_many_arguments)]
    fn decode_intra4x4(
        &self,
        addr: usize,
        slice_id: u32,
        modes: &[Intra4x4ModeSelect; 16],
        residual: &Residual,
        cbp: &CodedBlockPattern,
        qp: u8,
        buffer: &mut MacroblockBuffer,
        resolved_modes: &mut [Option<Intra4x4Mode>; 16],
    ) -> Result<()> {
        for block in 0..16 {
            let mode_a = self.neighbour_intra_mode(
                addr,
                slice_id,
                block,
                NeighbourDir::Left,
                resolved_modes,
            );
            let mode_b = self.neighbour_intra_mode(
                addr,
                slice_id,
                block,
                NeighbourDir::Above,
                resolved_modes,
            );
            let mode = derive_4x4_mode(modes[block], mode_a, mode_b)?;
            resolved_modes[block] = Some(mode);

            let neighbours = self.block_neighbours(addr, slice_id, block, buffer);
            let mut predicted = [0u8; 16];
            predict_4x4(mode, &neighbours, &mut predicted)?;

            let bx = (block % 4) * 4;
            let by = (block / 4) * 4;
            for y in 0..4 {
                for x in 0..4 {
                    buffer.luma[(bx + x) + (by + y) * 16] = predicted[x + y * 4];
                }
            }

            let coded = if cbp.codes_luma_block(block) {
                &residual.luma[block]
            } else {
                &ResidualBlock::EMPTY
            };
            transform_add(coded, qp, None, &mut buffer.luma[bx + by * 16..], 16);
        }

        Ok(())
    }
}

/// Partition motion resolved against the neighbourhood, ready for sample
/// prediction.
struct ResolvedMotion {
    partitions: Vec<PartitionPrediction>,
    mv: [MotionVector; 16],
    ref_idx: [i8; 16],
}

impl Default for ResolvedMotion {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            mv: [MotionVector::zero(); 16],
            ref_idx: [-1; 16],
        }
    }
}

impl ResolvedMotion {
    /// Record a resolved partition and propagate its motion data to the
    /// covered 4x4 blocks.
    fn push(
        &mut self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        mv: MotionVector,
        ref_idx: u8,
    ) {
        self.partitions.push(PartitionPrediction {
            x,
            y,
            width,
            height,
            mv,
            ref_idx: ref_idx as usize,
        });

        for block_y in y / 4..(y + height) / 4 {
            for block_x in x / 4..(x + width) / 4 {
                let block = block_x + block_y * 4;
                self.mv[block] = mv;
                self.ref_idx[block] = ref_idx as i8;
            }
        }
    }
}

/// Apply the luma residual of a non-Intra_4x4 macroblock: sixteen 4x4
/// blocks in raster order, with the Intra_16x16 DC injection when present.
fn apply_luma_residual(
    buffer: &mut MacroblockBuffer,
    residual: &Residual,
    cbp: &CodedBlockPattern,
    qp: u8,
    dc: Option<&[i32; 16]>,
) {
    for block in 0..16 {
        let coded = if cbp.codes_luma_block(block) {
            &residual.luma[block]
        } else {
            &ResidualBlock::EMPTY
        };

        let offset = (block % 4) * 4 + (block / 4) * 4 * 16;
        transform_add(coded, qp, dc.map(|d| d[block]), &mut buffer.luma[offset..], 16);
    }
}

/// Apply the chroma residual: per component, the 2x2 DC transform followed
/// by four 4x4 blocks with injected DC values.
fn apply_chroma_residual(
    buffer: &mut MacroblockBuffer,
    residual: &Residual,
    cbp: &CodedBlockPattern,
    qp_c: u8,
) {
    for component in 0..2 {
        let dc = match cbp.chroma {
            ChromaPattern::None => None,
            _ => Some(chroma_dc_transform(&residual.chroma_dc[component], qp_c)),
        };

        let plane = if component == 0 {
            &mut buffer.chroma_b
        } else {
            &mut buffer.chroma_r
        };

        for block in 0..4 {
            let coded = if matches!(cbp.chroma, ChromaPattern::Full) {
                &residual.chroma[component * 4 + block]
            } else {
                &ResidualBlock::EMPTY
            };

            let offset = (block % 2) * 4 + (block / 2) * 4 * 8;
            transform_add(
                coded,
                qp_c,
                dc.as_ref().map(|d| d[block]),
                &mut plane[offset..],
                8,
            );
        }
    }
}

fn collect_luma_totals(total_coeff: &mut [u8; 24], residual: &Residual) {
    for (block, entry) in total_coeff.iter_mut().take(16).enumerate() {
        *entry = residual.luma[block].total_coeff;
    }
}

fn collect_chroma_totals(total_coeff: &mut [u8; 24], residual: &Residual) {
    for block in 0..8 {
        total_coeff[16 + block] = residual.chroma[block].total_coeff;
    }
}

#[cfg(test)]
mod tests {
    use crate::decoder::state::H264State;
    use crate::decoder::types::{DecoderOption, SliceParameters, SliceType};
    use crate::decoder::DecodeState;
    use crate::decoder::Image;
    use crate::error::Error;
    use crate::types::{
        Intra16x16Mode, Intra4x4ModeSelect, IntraChromaMode, MacroblockLayer, MotionVector,
        PcmSamples, Prediction, Residual,
    };

    fn slice(slice_type: SliceType) -> SliceParameters {
        SliceParameters {
            slice_id: 0,
            slice_type,
            qp: 26,
            chroma_qp_index_offset: 0,
        }
    }

    fn pcm_layer(luma: u8, chroma: u8) -> MacroblockLayer {
        MacroblockLayer {
            prediction: Prediction::Pcm(Box::new(PcmSamples {
                luma: [luma; 256],
                chroma_b: [chroma; 64],
                chroma_r: [chroma; 64],
            })),
            coded_block_pattern: Default::default(),
            qp_delta: 0,
            residual: Residual::default(),
        }
    }

    fn empty_layer(prediction: Prediction) -> MacroblockLayer {
        MacroblockLayer {
            prediction,
            coded_block_pattern: Default::default(),
            qp_delta: 0,
            residual: Residual::default(),
        }
    }

    fn reference_picture() -> Image {
        let mut reference = Image::new(2, 2).unwrap();
        let stride = reference.luma_samples_per_row();
        for (i, sample) in reference.as_luma_mut().iter_mut().enumerate() {
            *sample = ((i % stride) * 2 + i / stride) as u8;
        }
        for (i, sample) in reference.as_chroma_b_mut().iter_mut().enumerate() {
            *sample = (i % 127) as u8;
        }
        for (i, sample) in reference.as_chroma_r_mut().iter_mut().enumerate() {
            *sample = (i % 111) as u8;
        }
        reference
    }

    #[test]
    fn macroblock_requires_slice_context() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        let result = state.decode_macroblock(0, &pcm_layer(1, 2), &[]);
        assert_eq!(result, Err(Error::InvalidSemantics));
    }

    #[test]
    fn pcm_copies_raw_samples() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        state.decode_macroblock(0, &pcm_layer(201, 77), &[]).unwrap();

        let stride = state.image().luma_samples_per_row();
        assert_eq!(state.image().as_luma()[0], 201);
        assert_eq!(state.image().as_luma()[15 + 15 * stride], 201);
        assert_eq!(state.image().as_luma()[16], 0);
        assert_eq!(state.image().as_chroma_b()[0], 77);

        let mb = state.macroblock(0).unwrap();
        assert_eq!(mb.state, DecodeState::Decoded);
        assert!(mb.is_intra);
        assert_eq!(mb.qp, 0);
        assert!(mb.total_coeff.iter().all(|&c| c == 16));
    }

    #[test]
    fn second_write_is_a_no_op() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        state.decode_macroblock(0, &pcm_layer(50, 60), &[]).unwrap();
        let first: Vec<u8> = state.image().as_luma().to_vec();

        // Different samples, same macroblock: the image write is guarded.
        state.decode_macroblock(0, &pcm_layer(99, 98), &[]).unwrap();
        assert_eq!(state.image().as_luma(), &first[..]);
    }

    #[test]
    fn skip_macroblock_copies_reference() {
        let reference = reference_picture();
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::P));

        state
            .decode_macroblock(0, &empty_layer(Prediction::Skip), std::slice::from_ref(&reference))
            .unwrap();

        // No causal neighbours at the picture corner: the inferred motion
        // is zero, so the macroblock is a straight copy.
        let stride = state.image().luma_samples_per_row();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(
                    state.image().as_luma()[x + y * stride],
                    reference.as_luma()[x + y * stride]
                );
            }
        }

        let mb = state.macroblock(0).unwrap();
        assert!(!mb.is_intra);
        assert_eq!(mb.ref_idx, [0; 16]);
        assert_eq!(mb.mv, [MotionVector::zero(); 16]);
    }

    #[test]
    fn skip_macroblock_is_invalid_in_intra_slices() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        let result = state.decode_macroblock(0, &empty_layer(Prediction::Skip), &[]);
        assert_eq!(result, Err(Error::InvalidSemantics));
        assert_eq!(state.macroblock(0).unwrap().state, DecodeState::NotAttempted);
    }

    #[test]
    fn inter_16x16_applies_decoded_vector() {
        let reference = reference_picture();
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::P));

        // No neighbours: the predictor is zero, so the vector is the
        // parsed difference, one whole sample right and down.
        let layer = empty_layer(Prediction::Inter16x16(crate::types::InterPartition {
            ref_idx: 0,
            mvd: MotionVector::from_units(4, 4),
        }));
        state
            .decode_macroblock(0, &layer, std::slice::from_ref(&reference))
            .unwrap();

        let stride = state.image().luma_samples_per_row();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(
                    state.image().as_luma()[x + y * stride],
                    reference.as_luma()[(x + 1) + (y + 1) * stride]
                );
            }
        }

        let mb = state.macroblock(0).unwrap();
        assert_eq!(mb.mv, [MotionVector::from_units(4, 4); 16]);
    }

    #[test]
    fn out_of_range_vector_fails_the_macroblock() {
        let reference = reference_picture();
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::P));

        let layer = empty_layer(Prediction::Inter16x16(crate::types::InterPartition {
            ref_idx: 0,
            mvd: MotionVector::from_units(3000, 0),
        }));
        let result = state.decode_macroblock(0, &layer, std::slice::from_ref(&reference));

        assert_eq!(result, Err(Error::MotionVectorOutOfRange));
        assert_eq!(state.macroblock(0).unwrap().state, DecodeState::NotAttempted);
    }

    #[test]
    fn missing_reference_fails_the_macroblock() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::P));

        let result = state.decode_macroblock(0, &empty_layer(Prediction::Skip), &[]);
        assert_eq!(result, Err(Error::ReferencePictureUnavailable));
    }

    #[test]
    fn intra_16x16_dc_without_neighbours_is_mid_gray() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        let layer = empty_layer(Prediction::Intra16x16 {
            mode: Intra16x16Mode::Dc,
            chroma_mode: IntraChromaMode::Dc,
        });
        state.decode_macroblock(0, &layer, &[]).unwrap();

        let stride = state.image().luma_samples_per_row();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(state.image().as_luma()[x + y * stride], 128);
            }
        }
        let chroma_stride = state.image().chroma_samples_per_row();
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(state.image().as_chroma_b()[x + y * chroma_stride], 128);
                assert_eq!(state.image().as_chroma_r()[x + y * chroma_stride], 128);
            }
        }
    }

    #[test]
    fn intra_16x16_plane_requires_neighbours() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        let layer = empty_layer(Prediction::Intra16x16 {
            mode: Intra16x16Mode::Plane,
            chroma_mode: IntraChromaMode::Dc,
        });
        let result = state.decode_macroblock(0, &layer, &[]);
        assert_eq!(result, Err(Error::IntraNeighbourUnavailable));
    }

    #[test]
    fn intra_4x4_all_most_probable_defaults_to_dc() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        let layer = empty_layer(Prediction::Intra4x4 {
            modes: [Intra4x4ModeSelect::MostProbable; 16],
            chroma_mode: IntraChromaMode::Dc,
        });
        state.decode_macroblock(0, &layer, &[]).unwrap();

        // Every block derives DC (unavailable neighbours), and with no
        // neighbouring samples at the picture corner the first block is
        // flat 128; its successors predict from it and stay at 128.
        let stride = state.image().luma_samples_per_row();
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(state.image().as_luma()[x + y * stride], 128);
            }
        }

        let mb = state.macroblock(0).unwrap();
        assert!(mb
            .intra_modes
            .iter()
            .all(|m| *m == Some(crate::types::Intra4x4Mode::Dc)));
    }

    #[test]
    fn vertical_4x4_continues_the_macroblock_above() {
        let mut state = H264State::new(1, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        state.decode_macroblock(0, &pcm_layer(90, 64), &[]).unwrap();

        // The top row of blocks picks directional modes that continue the
        // flat macroblock above; the rest derive their most probable mode
        // from it. Every path replicates the 90s.
        let mut modes = [Intra4x4ModeSelect::MostProbable; 16];
        for select in modes.iter_mut().take(4) {
            *select = Intra4x4ModeSelect::Remainder(0);
        }
        let layer = empty_layer(Prediction::Intra4x4 {
            modes,
            chroma_mode: IntraChromaMode::Dc,
        });
        state.decode_macroblock(1, &layer, &[]).unwrap();
        let stride = state.image().luma_samples_per_row();
        for y in 16..32 {
            for x in 0..16 {
                assert_eq!(state.image().as_luma()[x + y * stride], 90);
            }
        }
    }

    #[test]
    fn qp_delta_accumulates_modulo_range() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        let mut layer = empty_layer(Prediction::Intra16x16 {
            mode: Intra16x16Mode::Dc,
            chroma_mode: IntraChromaMode::Dc,
        });
        layer.qp_delta = 3;
        state.decode_macroblock(0, &layer, &[]).unwrap();
        assert_eq!(state.macroblock(0).unwrap().qp, 29);

        layer.qp_delta = -10;
        state.decode_macroblock(1, &layer, &[]).unwrap();
        assert_eq!(state.macroblock(1).unwrap().qp, 19);
    }

    #[test]
    fn concealment_reaches_every_macroblock() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.begin_slice(slice(SliceType::I));

        state.decode_macroblock(0, &pcm_layer(100, 100), &[]).unwrap();
        state.conceal_picture(SliceType::I, &[]);

        assert!(!state.deblocking_disabled());
        assert!(state.image().as_luma().iter().all(|&s| s == 100));
        for addr in 1..4 {
            let mb = state.macroblock(addr).unwrap();
            assert_eq!(mb.state, DecodeState::Concealed);
            assert_eq!(mb.qp, 40);
        }
    }

    #[test]
    fn total_picture_loss_disables_deblocking() {
        let mut state = H264State::new(2, 2, DecoderOption::empty()).unwrap();
        state.begin_picture();
        state.conceal_picture(SliceType::I, &[]);

        assert!(state.deblocking_disabled());
        assert!(state.image().as_luma().iter().all(|&s| s == 128));
    }
}
