//! Reusable jump-flood propagation engine.
//!
//! Given a seed image in slot A, runs passes with geometrically decreasing
//! step sizes; each pass samples the eight neighbors at the current step
//! offset and keeps whichever candidate wins the client shader's comparator.
//! After `O(log(max(width, height)))` passes every pixel holds its winning
//! seed. The engine owns the ping-pong buffers, the step schedule, and the
//! parity discipline; the comparator lives in the client's step shader.
//!
//! Roles are derived from parity: on step `i` the slot with index `i % 2` is
//! read and the other written. Exactly one slot is writable per step by
//! construction — there are no swappable pointers to alias.

use crate::gpu::render_target::RenderTarget;
use crate::view::Viewport;

/// Uniform-slot stride for per-step parameters. Each step's offset vector is
/// written into its own 256-byte slot up front, because queued buffer writes
/// all land before the frame's commands execute — rewriting one buffer
/// between draws would leave every step reading the last value.
pub const STEP_SLOT_STRIDE: u64 = 256;

/// Upper bound on propagation steps per run. Covers a start step of 2^38
/// texels; real schedules top out near 16 steps at 8K.
pub const MAX_STEPS: usize = 40;

/// The two ping-pong buffer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// First slot; always holds the seed image.
    A,
    /// Second slot.
    B,
}

impl Slot {
    /// Index into the slot array.
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Geometric step schedule: `ceil(max/2), ceil(s/2), …, 1`.
pub fn step_schedule(max_dim: u32) -> Vec<u32> {
    let mut steps = Vec::new();
    let mut step = max_dim.div_ceil(2).max(1);
    loop {
        steps.push(step);
        if step <= 1 {
            break;
        }
        step = step.div_ceil(2);
    }
    steps
}

/// Schedule for a decay that starts at an arbitrary step size (dynamic
/// outlines derive the start from the view radius).
pub fn decay_schedule(start: u32) -> Vec<u32> {
    let mut steps = Vec::new();
    let mut step = start.max(1);
    loop {
        steps.push(step);
        if step <= 1 {
            break;
        }
        step = step.div_ceil(2);
    }
    steps
}

/// The ping-pong buffer pair plus the per-step uniform slots.
pub struct JumpFlood {
    slots: [RenderTarget; 2],
    step_buffer: wgpu::Buffer,
}

impl JumpFlood {
    /// Allocate both float slots and the step-slot buffer.
    #[must_use]
    pub fn new(
        device: &wgpu::Device,
        labels: [&'static str; 2],
        width: u32,
        height: u32,
    ) -> Self {
        let slots = [
            RenderTarget::new(
                device,
                labels[0],
                width,
                height,
                wgpu::TextureFormat::Rgba32Float,
            ),
            RenderTarget::new(
                device,
                labels[1],
                width,
                height,
                wgpu::TextureFormat::Rgba32Float,
            ),
        ];
        let step_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("JFA Step Slots"),
            size: STEP_SLOT_STRIDE * MAX_STEPS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { slots, step_buffer }
    }

    /// One slot's target (bind group creation, seed/resolve attachments).
    pub fn target(&self, slot: Slot) -> &RenderTarget {
        &self.slots[slot.index()]
    }

    /// The step-slot uniform buffer; bind with a dynamic offset.
    pub fn step_buffer(&self) -> &wgpu::Buffer {
        &self.step_buffer
    }

    /// Dynamic offset of step `i`'s uniform slot.
    pub fn step_offset(i: usize) -> u32 {
        (i as u64 * STEP_SLOT_STRIDE) as u32
    }

    /// Write the normalized step offsets for this run into their slots.
    /// Steps beyond [`MAX_STEPS`] never occur for any real target size.
    pub fn write_steps(&self, queue: &wgpu::Queue, steps: &[[f32; 2]]) {
        debug_assert!(steps.len() <= MAX_STEPS);
        let mut data = vec![0u8; steps.len() * STEP_SLOT_STRIDE as usize];
        for (i, step) in steps.iter().enumerate() {
            let offset = i * STEP_SLOT_STRIDE as usize;
            data[offset..offset + 8]
                .copy_from_slice(bytemuck::cast_slice(step));
        }
        queue.write_buffer(&self.step_buffer, 0, &data);
    }

    /// Run `n_steps` propagation passes scissored to the eye viewport,
    /// alternating read/write roles by parity. `bind_groups[p]` must read
    /// the slot with index `p` and carry the step slots as its only
    /// dynamic-offset binding. Returns the slot holding the result.
    pub fn run(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        bind_groups: &[wgpu::BindGroup; 2],
        scissor: Viewport,
        n_steps: usize,
    ) -> Slot {
        for i in 0..n_steps {
            let read = i % 2;
            let write = (i + 1) % 2;

            let mut pass =
                encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("JFA Step Pass"),
                    color_attachments: &[Some(
                        wgpu::RenderPassColorAttachment {
                            view: &self.slots[write].view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Load,
                                store: wgpu::StoreOp::Store,
                            },
                            depth_slice: None,
                        },
                    )],
                    depth_stencil_attachment: None,
                    ..Default::default()
                });
            pass.set_scissor_rect(
                scissor.x,
                scissor.y,
                scissor.width,
                scissor.height,
            );
            pass.set_pipeline(pipeline);
            pass.set_bind_group(
                0,
                &bind_groups[read],
                &[Self::step_offset(i)],
            );
            pass.draw(0..3, 0..1);
        }

        if n_steps % 2 == 0 {
            Slot::A
        } else {
            Slot::B
        }
    }

    /// Reallocate both slots for a new size. No-op on equal dimensions.
    /// Clients must recreate their bind groups when this returns `true`.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> bool {
        let a = self.slots[0].resize(device, width, height);
        let b = self.slots[1].resize(device, width, height);
        a || b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_halves_down_to_one() {
        assert_eq!(step_schedule(8), vec![4, 2, 1]);
        assert_eq!(step_schedule(9), vec![5, 3, 2, 1]);
        assert_eq!(step_schedule(1), vec![1]);
        assert_eq!(step_schedule(1920), vec![960, 480, 240, 120, 60, 30, 15, 8, 4, 2, 1]);
    }

    #[test]
    fn schedule_length_is_within_log_bound() {
        for max_dim in [1u32, 2, 3, 8, 9, 640, 1080, 1920, 4096, 8191] {
            let bound = (max_dim as f32).log2().ceil() as usize + 1;
            let len = step_schedule(max_dim).len();
            assert!(
                len <= bound,
                "{max_dim}: {len} steps exceeds bound {bound}"
            );
            assert!(len <= MAX_STEPS);
        }
    }

    #[test]
    fn decay_schedule_starts_where_asked() {
        assert_eq!(decay_schedule(11), vec![11, 6, 3, 2, 1]);
        assert_eq!(decay_schedule(0), vec![1]);
    }

    // CPU model of the propagation loop: same parity discipline, same
    // neighbor pattern, same viewport skip rule, nearest-seed comparator.

    #[derive(Clone, Copy, PartialEq, Debug)]
    struct Texel {
        seed: Option<(i32, i32)>,
    }

    const SENTINEL: Texel = Texel { seed: None };

    fn dist2(a: (i32, i32), b: (i32, i32)) -> i64 {
        let dx = i64::from(a.0 - b.0);
        let dy = i64::from(a.1 - b.1);
        dx * dx + dy * dy
    }

    struct Grid {
        w: i32,
        h: i32,
        texels: Vec<Texel>,
        viewport: (i32, i32, i32, i32),
    }

    impl Grid {
        fn new(w: i32, h: i32, seeds: &[(i32, i32)]) -> Self {
            let mut texels = vec![SENTINEL; (w * h) as usize];
            for &s in seeds {
                texels[(s.1 * w + s.0) as usize] = Texel { seed: Some(s) };
            }
            Self {
                w,
                h,
                texels,
                viewport: (0, 0, w, h),
            }
        }

        fn propagate(&mut self, schedule: &[u32]) {
            let mut read = self.texels.clone();
            let mut write = self.texels.clone();
            for &step in schedule {
                let step = step as i32;
                for y in 0..self.h {
                    for x in 0..self.w {
                        let mut best = read[(y * self.w + x) as usize];
                        for dy in -1..=1 {
                            for dx in -1..=1 {
                                if dx == 0 && dy == 0 {
                                    continue;
                                }
                                let (sx, sy) = (x + dx * step, y + dy * step);
                                let (vx, vy, vw, vh) = self.viewport;
                                if sx < vx
                                    || sx >= vx + vw
                                    || sy < vy
                                    || sy >= vy + vh
                                {
                                    continue;
                                }
                                let candidate =
                                    read[(sy * self.w + sx) as usize];
                                let Some(seed) = candidate.seed else {
                                    continue;
                                };
                                let better = match best.seed {
                                    None => true,
                                    Some(current) => {
                                        dist2((x, y), seed)
                                            < dist2((x, y), current)
                                    }
                                };
                                if better {
                                    best = candidate;
                                }
                            }
                        }
                        write[(y * self.w + x) as usize] = best;
                    }
                }
                std::mem::swap(&mut read, &mut write);
            }
            self.texels = read;
        }
    }

    #[test]
    fn single_seed_floods_every_pixel_within_bound() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut grid = Grid::new(16, 16, &[(5, 9)]);
        grid.propagate(&step_schedule(16));
        assert!(grid.texels.iter().all(|t| t.seed == Some((5, 9))));
    }

    #[test]
    fn two_corner_seeds_match_brute_force_nearest() {
        let seeds = [(0, 0), (7, 7)];
        let mut grid = Grid::new(8, 8, &seeds);
        grid.propagate(&step_schedule(8));

        for y in 0..8 {
            for x in 0..8 {
                let found = grid.texels[(y * 8 + x) as usize].seed;
                let found = match found {
                    Some(s) => s,
                    None => panic!("({x},{y}) left unseeded"),
                };
                let found_d = dist2((x, y), found);
                let best_d = seeds
                    .iter()
                    .map(|&s| dist2((x, y), s))
                    .min()
                    .unwrap_or(i64::MAX);
                assert_eq!(
                    found_d, best_d,
                    "({x},{y}) found {found:?}, not a nearest seed"
                );
            }
        }
    }

    #[test]
    fn empty_seed_image_stays_sentinel() {
        let mut grid = Grid::new(8, 8, &[]);
        grid.propagate(&step_schedule(8));
        assert!(grid.texels.iter().all(|t| t.seed.is_none()));
    }

    #[test]
    fn propagation_never_crosses_the_viewport_boundary() {
        // Stereo half-viewports: a seed in the left half must not reach the
        // right half, whose pixels stay sentinel.
        let mut grid = Grid::new(16, 8, &[(3, 4)]);
        grid.viewport = (0, 0, 8, 8);
        grid.propagate(&step_schedule(16));
        for y in 0..8 {
            for x in 0..16 {
                let seeded = grid.texels[(y * 16 + x) as usize].seed.is_some();
                assert_eq!(seeded, x < 8, "leak at ({x},{y})");
            }
        }
    }

    #[test]
    fn parity_of_final_slot_follows_step_count() {
        // Even step counts land back in A, odd in B.
        assert_eq!(step_schedule(8).len() % 2, 1); // 3 steps -> B
        assert_eq!(step_schedule(9).len() % 2, 0); // 4 steps -> A
    }
}
