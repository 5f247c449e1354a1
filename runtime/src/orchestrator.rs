use crate::config::EqualizeConfig;
use crate::state::PipelineState;
use crate::{Error, Result};
use heq_core::{CumulativeTable, DynGrayImage, Histogram, Lut, SampleDepth};
use heq_hal::{
    estimate_run_bytes, fits_in_budget, AccessMode, BackendType, Bindings, ComputeContext,
    ComputeDevice, CpuBackend, Geometry, StageArgs,
};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Wall-clock time spent in each stage, barrier included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub histogram: Duration,
    pub cumulative: Duration,
    pub normalize: Duration,
    pub back_project: Duration,
    /// Whole run, including program build, allocation and transfers.
    pub total: Duration,
}

/// Intermediate tables read back after their stage barriers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedTables {
    pub histogram: Histogram,
    pub cumulative: CumulativeTable,
    pub lut: Lut,
}

#[derive(Debug, Clone)]
pub struct EqualizeReport {
    pub image: DynGrayImage,
    pub backend: String,
    pub backend_type: BackendType,
    pub state: PipelineState,
    pub timings: StageTimings,
    pub tables: Option<CapturedTables>,
}

#[derive(Default)]
struct PartialTables {
    histogram: Option<Histogram>,
    cumulative: Option<CumulativeTable>,
    lut: Option<Lut>,
}

/// One equalization run on a compute context.
///
/// A pipeline is single use: after `run` it is either `Complete` or `Failed`
/// and a second `run` is rejected as an invalid transition.
pub struct Pipeline<'a, C: ComputeContext> {
    ctx: &'a C,
    config: &'a EqualizeConfig,
    state: PipelineState,
}

impl<'a, C: ComputeContext> Pipeline<'a, C> {
    pub fn new(ctx: &'a C, config: &'a EqualizeConfig) -> Self {
        Self {
            ctx,
            config,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run(&mut self, image: &DynGrayImage) -> Result<EqualizeReport> {
        if self.state != PipelineState::Idle {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: PipelineState::DepthSelected,
            });
        }

        let started = Instant::now();
        match self.execute(image, started) {
            Ok(report) => {
                tracing::info!(
                    backend = self.ctx.name(),
                    depth = %image.depth(),
                    pixels = image.pixel_count(),
                    elapsed_ms = report.timings.total.as_secs_f64() * 1e3,
                    "equalization complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::debug!(state = %self.state, error = %e, "equalization failed");
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    fn advance(&mut self, next: PipelineState) -> Result<()> {
        self.state.advance(next)
    }

    fn hal<T>(&self, result: heq_hal::Result<T>) -> Result<T> {
        result.map_err(|e| Error::from_hal(e, self.state))
    }

    /// Dispatch one stage, wait on its barrier and move to `next`.
    fn stage(
        &mut self,
        program: &C::Program,
        args: StageArgs<'_, C::Buffer>,
        next: PipelineState,
    ) -> Result<Duration> {
        let started = Instant::now();
        let stage = args.stage();
        self.hal(self.ctx.dispatch(program, args))?;
        self.hal(self.ctx.barrier())?;
        let elapsed = started.elapsed();
        tracing::debug!(%stage, elapsed_us = elapsed.as_micros() as u64, "stage barrier passed");
        self.advance(next)?;
        Ok(elapsed)
    }

    fn execute(&mut self, image: &DynGrayImage, started: Instant) -> Result<EqualizeReport> {
        let depth = image.depth();
        let pixel_count = u32::try_from(image.pixel_count()).map_err(|_| {
            Error::UnsupportedInput(heq_core::Error::ImageTooLarge {
                pixels: image.pixel_count() as u64,
                limit: heq_core::MAX_PIXELS,
            })
        })?;
        self.advance(PipelineState::DepthSelected)?;

        let geometry = Geometry {
            depth,
            pixel_count,
            mode: self.config.normalize,
        };
        self.check_budget(depth, image.pixel_count())?;

        let program = self.hal(self.ctx.build_program(depth))?;

        let levels = geometry.levels();
        let source = self.hal(self.ctx.upload("source", &image.to_words(), AccessMode::ReadOnly))?;
        let histogram = self.hal(self.ctx.alloc_zeroed("histogram", levels, AccessMode::ReadWrite))?;
        let cumulative = self.hal(self.ctx.alloc_zeroed("cumulative", levels, AccessMode::ReadWrite))?;
        let lut = self.hal(self.ctx.alloc_zeroed("lut", levels, AccessMode::ReadWrite))?;
        let output = self.hal(self.ctx.alloc_zeroed(
            "output",
            geometry.image_words(),
            AccessMode::WriteOnly,
        ))?;

        let capture = self.config.capture_tables;
        let mut tables = PartialTables::default();
        let mut timings = StageTimings::default();

        timings.histogram = self.stage(
            &program,
            StageArgs {
                geometry,
                bindings: Bindings::Histogram {
                    image: &source,
                    histogram: &histogram,
                },
            },
            PipelineState::HistogramReady,
        )?;
        if capture {
            tables.histogram = Some(Histogram::from_vec(self.hal(self.ctx.read(&histogram))?));
        }

        timings.cumulative = self.stage(
            &program,
            StageArgs {
                geometry,
                bindings: Bindings::Cumulative {
                    histogram: &histogram,
                    cumulative: &cumulative,
                },
            },
            PipelineState::CumulativeReady,
        )?;
        if capture {
            tables.cumulative = Some(CumulativeTable::from_vec(self.hal(self.ctx.read(&cumulative))?));
        }

        timings.normalize = self.stage(
            &program,
            StageArgs {
                geometry,
                bindings: Bindings::Normalize {
                    cumulative: &cumulative,
                    lut: &lut,
                },
            },
            PipelineState::LutReady,
        )?;
        if capture {
            tables.lut = Some(Lut::from_vec(self.hal(self.ctx.read(&lut))?));
        }

        // Back-projection has no table of its own; its barrier is followed
        // directly by the read-back, so stay in LutReady until both succeed.
        let back_started = Instant::now();
        let stage_args = StageArgs {
            geometry,
            bindings: Bindings::BackProject {
                image: &source,
                lut: &lut,
                output: &output,
            },
        };
        self.hal(self.ctx.dispatch(&program, stage_args))?;
        self.hal(self.ctx.barrier())?;
        timings.back_project = back_started.elapsed();

        let words = self.hal(self.ctx.read(&output))?;
        let equalized = self.hal(image.with_words(&words).map_err(heq_hal::Error::from))?;
        self.advance(PipelineState::Complete)?;
        timings.total = started.elapsed();

        let tables = match tables {
            PartialTables {
                histogram: Some(histogram),
                cumulative: Some(cumulative),
                lut: Some(lut),
            } => Some(CapturedTables {
                histogram,
                cumulative,
                lut,
            }),
            _ => None,
        };

        Ok(EqualizeReport {
            image: equalized,
            backend: self.ctx.name().to_string(),
            backend_type: self.ctx.backend_type(),
            state: self.state,
            timings,
            tables,
        })
    }

    fn check_budget(&self, depth: SampleDepth, pixel_count: usize) -> Result<()> {
        if self.ctx.backend_type() != BackendType::WebGpu {
            return Ok(());
        }
        let required = estimate_run_bytes(depth, pixel_count);
        if !fits_in_budget(required, self.config.gpu_max_bytes) {
            return Err(Error::ResourceExhausted(format!(
                "run needs {required} device bytes, budget is {}",
                self.config.gpu_max_bytes.unwrap_or(0)
            )));
        }
        Ok(())
    }
}

/// Reusable entry point owning a configuration and a CPU backend; the GPU
/// context is shared process wide and picked per run.
#[derive(Debug, Clone)]
pub struct Equalizer {
    config: EqualizeConfig,
    cpu: CpuBackend,
}

impl Equalizer {
    pub fn new(config: EqualizeConfig) -> Result<Self> {
        let cpu = match config.cpu_threads {
            Some(threads) => CpuBackend::with_threads(threads)
                .map_err(|e| Error::Config(format!("cpu pool of {threads} threads: {e}")))?,
            None => CpuBackend::new(),
        };
        Ok(Self { config, cpu })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EqualizeConfig::from_env()?)
    }

    pub fn config(&self) -> &EqualizeConfig {
        &self.config
    }

    /// Resolve the backend for an image of `pixel_count` pixels.
    pub fn device_for(&self, pixel_count: usize) -> Result<ComputeDevice> {
        ComputeDevice::select(self.config.backend, pixel_count, self.config.gpu_min_pixels, &self.cpu)
            .map_err(|e| Error::from_hal(e, PipelineState::Idle))
    }

    pub fn run(&self, image: &DynGrayImage) -> Result<EqualizeReport> {
        match self.device_for(image.pixel_count())? {
            ComputeDevice::Cpu(cpu) => self.run_on(&cpu, image),
            ComputeDevice::Gpu(gpu) => self.run_on(gpu.as_ref(), image),
        }
    }

    /// Run on an explicit context, bypassing backend selection.
    pub fn run_on<C: ComputeContext>(&self, ctx: &C, image: &DynGrayImage) -> Result<EqualizeReport> {
        Pipeline::new(ctx, &self.config).run(image)
    }

    pub fn equalize(&self, image: &DynGrayImage) -> Result<DynGrayImage> {
        self.run(image).map(|report| report.image)
    }

    /// Equalize raw little-endian samples tagged 1 (8-bit) or 2 (16-bit).
    pub fn equalize_raw(&self, width: u32, height: u32, depth_tag: u8, bytes: &[u8]) -> Result<DynGrayImage> {
        let image = DynGrayImage::from_raw(width, height, depth_tag, bytes)?;
        self.equalize(&image)
    }
}

static ENV_EQUALIZER: OnceLock<Equalizer> = OnceLock::new();

/// Process-wide equalizer configured from the environment.
///
/// The environment is read once, on the first successful call; a malformed
/// configuration is reported and retried on the next call.
pub fn env_equalizer() -> Result<&'static Equalizer> {
    if let Some(equalizer) = ENV_EQUALIZER.get() {
        return Ok(equalizer);
    }
    let equalizer = Equalizer::from_env()?;
    Ok(ENV_EQUALIZER.get_or_init(|| equalizer))
}

/// Equalize with the configuration from the environment.
pub fn equalize(image: &DynGrayImage) -> Result<DynGrayImage> {
    env_equalizer()?.equalize(image)
}
