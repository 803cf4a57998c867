//! GPU execution with [wgpu](https://github.com/gfx-rs/wgpu).
//!
//! The device and queue are injected; [`request_device`] is a convenience
//! for hosts without their own GPU context. Positions live in two storage
//! buffers with swapped read/write roles each dispatch, so every thread
//! observes the step's starting state no matter how the hardware schedules
//! the workgroups.

use glam::Vec4;

use crate::buffer::{padded_len, ParticleBuffer};
use crate::config::{PowerPreference, SimulationOptions};
use crate::error::Error;
use crate::kernel::{Kernel, StepParams};

/// Selects how a compute dispatch walks neighbour positions.
#[derive(Debug, Clone, Copy)]
pub enum KernelStrategy {
    /// Stages neighbours through workgroup shared memory, one block at a
    /// time. Based on <https://developer.nvidia.com/gpugems/gpugems3/part-v-physics-simulation/chapter-31-fast-n-body-simulation-cuda>.
    Shared(u32),
    /// Reads neighbours straight from global memory.
    Global(u32),
}

impl Default for KernelStrategy {
    #[inline]
    fn default() -> Self {
        Self::Global(64)
    }
}

impl KernelStrategy {
    /// Returns the assembled shader for this strategy: the dispatch skeleton
    /// with the block size substituted, followed by the shared interaction
    /// code.
    #[inline]
    pub fn as_shader(&self) -> String {
        let (skeleton, block_size) = match self {
            Self::Shared(block_size) => (include_str!("bruteforce_shared.wgsl"), block_size),
            Self::Global(block_size) => (include_str!("bruteforce.wgsl"), block_size),
        };

        skeleton.replace("#BLOCK_SIZE", &(block_size.to_string() + "u"))
            + include_str!("interaction.wgsl")
    }

    /// Threads per workgroup for the shader of this [`KernelStrategy`].
    #[inline]
    pub const fn block_size(&self) -> u32 {
        match self {
            Self::Global(block_size) | Self::Shared(block_size) => *block_size,
        }
    }
}

/// Acquires a device honoring the configured adapter preferences.
///
/// No fallback is attempted beyond what the options ask for; an acquisition
/// failure is fatal to the caller.
pub async fn request_device(
    options: &SimulationOptions,
) -> Result<(wgpu::Device, wgpu::Queue), Error> {
    let instance = wgpu::Instance::default();

    let power_preference = match options.power_preference {
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
    };

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            force_fallback_adapter: options.force_fallback_adapter,
            compatible_surface: None,
        })
        .await
        .ok_or(Error::AdapterUnavailable)?;

    log::info!("running on {}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        )
        .await?;

    Ok((device, queue))
}

/// Per-dispatch scalars, mirrored by the `Params` uniform in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    bodies: u32,
    padded: u32,
    dt: f32,
    gravitational_constant: f32,
    softening_sq: f32,
    damping: f32,
    pad: [f32; 2],
}

impl Uniforms {
    #[inline]
    fn new(bodies: u32, padded: u32, params: &StepParams) -> Self {
        Self {
            bodies,
            padded,
            dt: params.dt,
            gravitational_constant: params.gravitational_constant,
            softening_sq: params.softening * params.softening,
            damping: params.damping,
            pad: [0.0; 2],
        }
    }
}

/// A [`Kernel`] that integrates on the GPU and keeps the particle state
/// resident there between steps.
///
/// Hosts that render the cloud drive it through [`upload`](Self::upload),
/// [`step_resident`](Self::step_resident) and
/// [`position_buffer`](Self::position_buffer), leaving the state on the
/// device. The [`Kernel`] implementation instead round-trips the host
/// buffer on every call, which lets the GPU drop into the same scheduler
/// seam as the CPU kernels at a bandwidth cost.
pub struct GpuKernel {
    device: wgpu::Device,
    queue: wgpu::Queue,
    strategy: KernelStrategy,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    positions: [wgpu::Buffer; 2],
    velocities: wgpu::Buffer,
    bind_groups: [wgpu::BindGroup; 2],
    front: usize,
    bodies: u32,
    padded: u32,
}

impl GpuKernel {
    /// Builds the pipeline and state buffers for the given options.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        strategy: KernelStrategy,
        options: &SimulationOptions,
    ) -> Result<Self, Error> {
        Self::with_shader(device, queue, strategy, &strategy.as_shader(), options)
    }

    /// Builds the kernel around externally supplied shader text.
    ///
    /// The shader must expose a `main` compute entry point over the bind
    /// group layout of the bundled shaders. Validation failures surface as
    /// [`Error::ShaderCompilation`] with the backend's diagnostic text.
    pub fn with_shader(
        device: wgpu::Device,
        queue: wgpu::Queue,
        strategy: KernelStrategy,
        shader: &str,
        options: &SimulationOptions,
    ) -> Result<Self, Error> {
        let options = options.sanitized();
        let bodies = options.bodies;
        let padded = padded_len(bodies, strategy.block_size()) as u32;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
            label: None,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Integration layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: None,
            source: wgpu::ShaderSource::Wgsl(shader.into()),
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Integration pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(Error::ShaderCompilation(error.to_string()));
        }

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Params buffer"),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            size: std::mem::size_of::<Uniforms>() as u64,
            mapped_at_creation: false,
        });

        let (positions, velocities) = Self::state_buffers(&device, padded);
        let bind_groups =
            Self::swap_bind_groups(&device, &bind_group_layout, &uniforms, &positions, &velocities);

        log::debug!(
            "gpu kernel ready: {bodies} bodies in {padded} slots, block size {}",
            strategy.block_size()
        );

        Ok(Self {
            device,
            queue,
            strategy,
            pipeline,
            bind_group_layout,
            uniforms,
            positions,
            velocities,
            bind_groups,
            front: 0,
            bodies,
            padded,
        })
    }

    /// Seeds both GPU position slots and the velocity buffer from `buffer`.
    pub fn upload(&mut self, buffer: &ParticleBuffer) -> Result<(), Error> {
        self.check_extents(buffer)?;

        let positions = bytemuck::cast_slice(buffer.positions_padded());
        self.queue.write_buffer(&self.positions[0], 0, positions);
        self.queue.write_buffer(&self.positions[1], 0, positions);
        self.queue
            .write_buffer(&self.velocities, 0, bytemuck::cast_slice(buffer.velocities_padded()));
        self.front = 0;

        Ok(())
    }

    /// Submits one integration dispatch over the resident state and flips
    /// the position buffers.
    pub fn step_resident(&mut self, params: &StepParams) {
        let uniforms = Uniforms::new(self.bodies, self.padded, params);
        self.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let encoder_descriptor = wgpu::CommandEncoderDescriptor { label: None };
        let mut encoder = self.device.create_command_encoder(&encoder_descriptor);

        encoder.push_debug_group("Integrate bodies");
        {
            let workgroups = self.padded.div_ceil(self.strategy.block_size().max(1));
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor::default());
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[self.front], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        encoder.pop_debug_group();

        self.queue.submit([encoder.finish()]);
        self.front ^= 1;
    }

    /// The position buffer holding the latest step's output, usable as a
    /// vertex buffer for instanced point-cloud drawing. Read-only for the
    /// caller; the next [`step_resident`](Self::step_resident) writes the
    /// other slot.
    #[inline]
    pub fn position_buffer(&self) -> &wgpu::Buffer {
        &self.positions[self.front]
    }

    /// Copies the resident state back into `buffer`.
    pub fn read_state(&self, buffer: &mut ParticleBuffer) -> Result<(), Error> {
        self.check_extents(buffer)?;

        let (positions, velocities) = buffer.state_padded_mut();
        self.read_back(positions, velocities);
        buffer.mirror_front();

        Ok(())
    }

    fn check_extents(&self, buffer: &ParticleBuffer) -> Result<(), Error> {
        if buffer.len() != self.bodies as usize {
            return Err(Error::BufferMismatch {
                expected: self.bodies as usize,
                found: buffer.len(),
            });
        }
        if buffer.padded_len() != self.padded as usize {
            return Err(Error::BufferMismatch {
                expected: self.padded as usize,
                found: buffer.padded_len(),
            });
        }

        Ok(())
    }

    /// Reallocates the state buffers when the particle count changes.
    fn resize(&mut self, bodies: u32, padded: u32) {
        if self.bodies == bodies && self.padded == padded {
            return;
        }

        log::debug!("reallocating gpu state for {bodies} bodies in {padded} slots");

        let (positions, velocities) = Self::state_buffers(&self.device, padded);
        self.bind_groups = Self::swap_bind_groups(
            &self.device,
            &self.bind_group_layout,
            &self.uniforms,
            &positions,
            &velocities,
        );
        self.positions = positions;
        self.velocities = velocities;
        self.front = 0;
        self.bodies = bodies;
        self.padded = padded;
    }

    fn state_buffers(device: &wgpu::Device, padded: u32) -> ([wgpu::Buffer; 2], wgpu::Buffer) {
        let size = padded as u64 * std::mem::size_of::<Vec4>() as u64;

        let position_buffer = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::VERTEX,
                size,
                mapped_at_creation: false,
            })
        };

        let velocities = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Velocity buffer"),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            size,
            mapped_at_creation: false,
        });

        (
            [position_buffer("Position buffer"), position_buffer("Position buffer (back)")],
            velocities,
        )
    }

    /// One bind group per ping-pong orientation, with the read and write
    /// position roles swapped.
    fn swap_bind_groups(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniforms: &wgpu::Buffer,
        positions: &[wgpu::Buffer; 2],
        velocities: &wgpu::Buffer,
    ) -> [wgpu::BindGroup; 2] {
        let bind_group = |src: &wgpu::Buffer, dst: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: src.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: dst.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: velocities.as_entire_binding(),
                    },
                ],
                label: None,
            })
        };

        [
            bind_group(&positions[0], &positions[1]),
            bind_group(&positions[1], &positions[0]),
        ]
    }

    fn read_back(&self, positions: &mut [Vec4], velocities: &mut [Vec4]) {
        let size = self.padded as u64 * std::mem::size_of::<Vec4>() as u64;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging buffer"),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            size: size * 2,
            mapped_at_creation: false,
        });

        let encoder_descriptor = wgpu::CommandEncoderDescriptor { label: None };
        let mut encoder = self.device.create_command_encoder(&encoder_descriptor);
        encoder.copy_buffer_to_buffer(&self.positions[self.front], 0, &staging, 0, size);
        encoder.copy_buffer_to_buffer(&self.velocities, 0, &staging, size, size);
        self.queue.submit([encoder.finish()]);

        let (sender, receiver) = flume::bounded(1);

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).unwrap()
        });

        self.device.poll(wgpu::Maintain::Wait).panic_on_timeout();
        pollster::block_on(receiver.recv_async())
            .unwrap()
            .expect("Could not read buffer");

        let view = slice.get_mapped_range();
        let state: &[Vec4] = bytemuck::cast_slice(&view);
        let (front, back) = state.split_at(self.padded as usize);
        positions.copy_from_slice(front);
        velocities.copy_from_slice(back);

        drop(view);
        staging.unmap();
    }
}

impl Kernel for GpuKernel {
    #[inline]
    fn snapshot_reads(&self) -> bool {
        false
    }

    fn integrate(
        &mut self,
        bodies: usize,
        src: &[Vec4],
        dst: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    ) {
        self.resize(bodies as u32, src.len() as u32);

        self.queue
            .write_buffer(&self.positions[self.front], 0, bytemuck::cast_slice(src));
        self.queue
            .write_buffer(&self.velocities, 0, bytemuck::cast_slice(velocities));

        self.step_resident(params);
        self.read_back(dst, velocities);
    }

    fn integrate_in_place(
        &mut self,
        bodies: usize,
        positions: &mut [Vec4],
        velocities: &mut [Vec4],
        params: &StepParams,
    ) {
        // The dispatch double-buffers device-side either way; the host
        // positions are simply overwritten with the result.
        let snapshot = positions.to_vec();
        self.integrate(bodies, &snapshot, positions, velocities, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferMode, BufferScheduler};
    use crate::kernel::tests as shared;

    fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
        pollster::block_on(request_device(&SimulationOptions::default())).ok()
    }

    #[test]
    fn shader_assembly_substitutes_block_size() {
        for strategy in [KernelStrategy::Global(64), KernelStrategy::Shared(128)] {
            let shader = strategy.as_shader();
            assert!(!shader.contains("#BLOCK_SIZE"));
            assert!(shader.contains(&format!("@workgroup_size({}u)", strategy.block_size())));
            assert!(shader.contains("fn main"));
            assert!(shader.contains("fn attraction"));
        }
    }

    #[test]
    fn uniforms_match_the_shader_layout() {
        assert_eq!(std::mem::size_of::<Uniforms>(), 32);
    }

    #[test]
    fn global_step_matches_reference() {
        let Some((device, queue)) = test_device() else { return };
        let options = shared::test_options(96, 32);
        let kernel = GpuKernel::new(device, queue, KernelStrategy::Global(32), &options).unwrap();
        shared::step_matches_reference(kernel);
    }

    #[test]
    fn shared_step_matches_reference() {
        let Some((device, queue)) = test_device() else { return };
        let options = shared::test_options(96, 32);
        let kernel = GpuKernel::new(device, queue, KernelStrategy::Shared(32), &options).unwrap();
        shared::step_matches_reference(kernel);
    }

    #[test]
    fn global_zero_dt_only_damps() {
        let Some((device, queue)) = test_device() else { return };
        let options = shared::test_options(64, 32);
        let kernel = GpuKernel::new(device, queue, KernelStrategy::Global(32), &options).unwrap();
        shared::zero_dt_only_damps(kernel);
    }

    #[test]
    fn shared_conserves_momentum() {
        let Some((device, queue)) = test_device() else { return };
        let options = shared::test_options(64, 32);
        let kernel = GpuKernel::new(device, queue, KernelStrategy::Shared(32), &options).unwrap();
        shared::momentum_conserved(kernel);
    }

    #[test]
    fn shared_padding_is_neutral() {
        let Some((device, queue)) = test_device() else { return };
        let Some((other_device, other_queue)) = test_device() else { return };

        shared::padding_is_neutral(
            GpuKernel::new(
                device,
                queue,
                KernelStrategy::Shared(32),
                &shared::test_options(96, 32),
            )
            .unwrap(),
            GpuKernel::new(
                other_device,
                other_queue,
                KernelStrategy::Shared(64),
                &shared::test_options(96, 64),
            )
            .unwrap(),
            1e-3,
        );
    }

    #[test]
    fn shared_memory_matches_global() {
        let Some((device, queue)) = test_device() else { return };
        let Some((other_device, other_queue)) = test_device() else { return };

        let options = shared::test_options(96, 32);
        let mut global =
            GpuKernel::new(device, queue, KernelStrategy::Global(32), &options).unwrap();
        let mut tiled =
            GpuKernel::new(other_device, other_queue, KernelStrategy::Shared(32), &options)
                .unwrap();

        let mut global_state = shared::test_buffer(96, 32);
        let mut tiled_state = global_state.clone();
        let params = StepParams {
            dt: 0.01,
            gravitational_constant: 1.0,
            softening: 0.5,
            damping: 0.95,
        };

        let scheduler = BufferScheduler::new(BufferMode::PingPong);
        for _ in 0..3 {
            scheduler.run(&mut global_state, &mut global, &params).unwrap();
            scheduler.run(&mut tiled_state, &mut tiled, &params).unwrap();
        }

        for i in 0..global_state.len() {
            shared::assert_close(tiled_state.positions()[i], global_state.positions()[i], 1e-3);
            shared::assert_close(tiled_state.velocities()[i], global_state.velocities()[i], 1e-3);
        }
    }

    #[test]
    fn resident_stepping_matches_the_kernel_path() {
        let Some((device, queue)) = test_device() else { return };
        let Some((other_device, other_queue)) = test_device() else { return };

        let options = shared::test_options(64, 32);
        let params = StepParams {
            dt: 0.01,
            gravitational_constant: 1.0,
            softening: 0.5,
            damping: 0.95,
        };

        let mut host_state = shared::test_buffer(64, 32);
        let mut kernel =
            GpuKernel::new(device, queue, KernelStrategy::Global(32), &options).unwrap();
        let scheduler = BufferScheduler::for_kernel(&kernel);
        for _ in 0..2 {
            scheduler.run(&mut host_state, &mut kernel, &params).unwrap();
        }

        let mut resident_state = shared::test_buffer(64, 32);
        let mut resident =
            GpuKernel::new(other_device, other_queue, KernelStrategy::Global(32), &options)
                .unwrap();
        resident.upload(&resident_state).unwrap();
        for _ in 0..2 {
            resident.step_resident(&params);
        }
        resident.read_state(&mut resident_state).unwrap();

        for i in 0..host_state.len() {
            shared::assert_close(resident_state.positions()[i], host_state.positions()[i], 1e-6);
            shared::assert_close(resident_state.velocities()[i], host_state.velocities()[i], 1e-6);
        }
    }

    #[test]
    fn position_buffer_is_drawable() {
        let Some((device, queue)) = test_device() else { return };
        let options = shared::test_options(64, 32);
        let kernel = GpuKernel::new(device, queue, KernelStrategy::default(), &options).unwrap();

        assert!(kernel
            .position_buffer()
            .usage()
            .contains(wgpu::BufferUsages::VERTEX));
    }

    #[test]
    fn upload_rejects_mismatched_extents() {
        let Some((device, queue)) = test_device() else { return };
        let options = shared::test_options(64, 32);
        let mut kernel =
            GpuKernel::new(device, queue, KernelStrategy::Global(32), &options).unwrap();

        let oversized = ParticleBuffer::new(96, 32);
        assert!(matches!(
            kernel.upload(&oversized),
            Err(Error::BufferMismatch { expected: 64, found: 96 })
        ));
    }

    #[test]
    fn broken_shader_surfaces_the_diagnostic() {
        let Some((device, queue)) = test_device() else { return };
        let options = shared::test_options(64, 32);

        let result = GpuKernel::with_shader(
            device,
            queue,
            KernelStrategy::Global(32),
            "fn main( {",
            &options,
        );
        assert!(matches!(result, Err(Error::ShaderCompilation(_))));
    }
}
