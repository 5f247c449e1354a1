use heq_core::{DynGrayImage, GrayImage, NormalizeMode, SampleDepth};
use heq_hal::{AccessMode, BackendPreference, BackendType, ComputeContext, CpuBackend, StageArgs, Stage};
use heq_runtime::{EqualizeConfig, Equalizer, Error, Pipeline, PipelineState};
use std::sync::atomic::{AtomicUsize, Ordering};

fn cpu_config() -> EqualizeConfig {
    EqualizeConfig::new()
        .with_backend(BackendPreference::Cpu)
        .with_capture_tables(true)
}

/// Deterministic xorshift so failures reproduce.
fn noise(seed: u64, len: usize) -> Vec<u64> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        })
        .collect()
}

fn random_u8(width: u32, height: u32, seed: u64) -> DynGrayImage {
    let data = noise(seed, (width * height) as usize)
        .into_iter()
        // Squash into a narrow band so equalization has something to stretch.
        .map(|v| 60 + (v % 40) as u8)
        .collect();
    GrayImage::<u8>::from_vec(width, height, data).unwrap().into()
}

fn random_u16(width: u32, height: u32, seed: u64) -> DynGrayImage {
    let data = noise(seed, (width * height) as usize)
        .into_iter()
        .map(|v| 1000 + (v % 5000) as u16)
        .collect();
    GrayImage::<u16>::from_vec(width, height, data).unwrap().into()
}

#[test]
fn test_histogram_sums_to_pixel_count() {
    let equalizer = Equalizer::new(cpu_config()).unwrap();
    for (image, pixels) in [
        (random_u8(37, 23, 1), 37 * 23),
        (random_u8(1, 1, 2), 1),
        (random_u16(19, 41, 3), 19 * 41),
    ] {
        let report = equalizer.run(&image).unwrap();
        let tables = report.tables.unwrap();
        assert_eq!(tables.histogram.total(), pixels as u64);
        assert_eq!(tables.cumulative.last(), pixels);
    }
}

#[test]
fn test_tables_are_monotonic_and_in_range() {
    for mode in [NormalizeMode::MinShifted, NormalizeMode::Proportional] {
        let equalizer = Equalizer::new(cpu_config().with_normalize(mode)).unwrap();
        for image in [random_u8(64, 48, 7), random_u16(33, 17, 8)] {
            let max_level = image.depth().max_level();
            let report = equalizer.run(&image).unwrap();
            let tables = report.tables.unwrap();
            assert!(tables.cumulative.is_monotonic());
            assert!(tables.lut.is_monotonic());
            assert!(tables.lut.as_slice().iter().all(|&v| v <= max_level));
            assert!(report.image.levels().iter().all(|&v| v <= max_level));
        }
    }
}

#[test]
fn test_narrow_band_is_stretched_to_full_range() {
    let equalizer = Equalizer::new(cpu_config()).unwrap();
    let output = equalizer.equalize(&random_u8(64, 64, 11)).unwrap();
    let levels = output.levels();
    assert_eq!(levels.iter().copied().min(), Some(0));
    assert_eq!(levels.iter().copied().max(), Some(255));
}

#[test]
fn test_flat_images_stay_flat() {
    let equalizer = Equalizer::new(cpu_config()).unwrap();
    for value in [0u8, 1, 128, 255] {
        let image: DynGrayImage = GrayImage::<u8>::filled(9, 5, value).unwrap().into();
        let output = equalizer.equalize(&image).unwrap();
        let first = output.levels()[0];
        assert!(output.levels().iter().all(|&v| v == first));
    }
    let image: DynGrayImage = GrayImage::<u16>::filled(4, 4, 40_000).unwrap().into();
    let output = equalizer.equalize(&image).unwrap();
    assert!(output.levels().iter().all(|&v| v == 40_000));
}

#[test]
fn test_four_level_scenario() {
    let equalizer = Equalizer::new(cpu_config()).unwrap();
    let image: DynGrayImage = GrayImage::<u8>::from_vec(2, 2, vec![0, 85, 170, 255]).unwrap().into();
    let report = equalizer.run(&image).unwrap();
    let tables = report.tables.unwrap();

    let occupied: Vec<_> = tables.histogram.occupied().collect();
    assert_eq!(occupied, vec![(0, 1), (85, 1), (170, 1), (255, 1)]);
    assert_eq!(tables.cumulative.get(84), Some(1));
    assert_eq!(tables.cumulative.get(255), Some(4));
    assert_eq!(tables.lut.apply(0), 0);
    assert_eq!(tables.lut.apply(255), 255);
    assert_eq!(report.image, image);
}

#[test]
fn test_all_zero_scenario() {
    let equalizer = Equalizer::new(cpu_config()).unwrap();
    let image: DynGrayImage = GrayImage::<u8>::filled(6, 7, 0).unwrap().into();
    let report = equalizer.run(&image).unwrap();
    let tables = report.tables.unwrap();

    assert_eq!(tables.histogram.occupied().collect::<Vec<_>>(), vec![(0, 42)]);
    assert!(tables.cumulative.as_slice().iter().all(|&c| c == 42));
    assert_eq!(report.image, image);
}

#[test]
fn test_depth_dispatch() {
    let equalizer = Equalizer::new(cpu_config()).unwrap();

    let eight = equalizer.equalize_raw(2, 1, 1, &[3, 9]).unwrap();
    assert_eq!(eight.depth(), SampleDepth::Eight);

    let report = equalizer
        .run(&DynGrayImage::from_raw(2, 1, 2, &[0x34, 0x12, 0x00, 0x80]).unwrap())
        .unwrap();
    assert_eq!(report.image.depth(), SampleDepth::Sixteen);
    assert_eq!(report.tables.unwrap().histogram.len(), 65536);

    for tag in [0u8, 3, 4, 8] {
        assert!(matches!(
            equalizer.equalize_raw(2, 1, tag, &[0; 4]),
            Err(Error::UnsupportedInput(_))
        ));
    }
}

#[test]
fn test_thread_count_does_not_change_output() {
    let image = random_u16(257, 129, 99);
    let single = Equalizer::new(cpu_config().with_cpu_threads(Some(1))).unwrap();
    let many = Equalizer::new(cpu_config().with_cpu_threads(Some(4))).unwrap();
    let a = single.run(&image).unwrap();
    let b = many.run(&image).unwrap();
    assert_eq!(a.image, b.image);
    assert_eq!(a.tables, b.tables);
}

#[test]
fn test_report_describes_run() {
    let equalizer = Equalizer::new(cpu_config()).unwrap();
    let report = equalizer.run(&random_u8(16, 16, 5)).unwrap();
    assert_eq!(report.backend_type, BackendType::Cpu);
    assert_eq!(report.state, PipelineState::Complete);
    assert!(report.timings.total >= report.timings.histogram);
}

/// CPU backend with injected failures, counting the stages it runs.
struct Faulty {
    inner: CpuBackend,
    fail_build: bool,
    fail_alloc: Option<&'static str>,
    fail_stage: Option<Stage>,
    dispatched: AtomicUsize,
}

impl Faulty {
    fn new() -> Self {
        Self {
            inner: CpuBackend::new(),
            fail_build: false,
            fail_alloc: None,
            fail_stage: None,
            dispatched: AtomicUsize::new(0),
        }
    }
}

impl ComputeContext for Faulty {
    type Buffer = <CpuBackend as ComputeContext>::Buffer;
    type Program = <CpuBackend as ComputeContext>::Program;

    fn backend_type(&self) -> BackendType {
        self.inner.backend_type()
    }

    fn name(&self) -> &str {
        "faulty"
    }

    fn build_program(&self, depth: SampleDepth) -> heq_hal::Result<Self::Program> {
        if self.fail_build {
            return Err(heq_hal::Error::ProgramBuild("entry point missing".into()));
        }
        self.inner.build_program(depth)
    }

    fn alloc_zeroed(&self, label: &str, words: usize, access: AccessMode) -> heq_hal::Result<Self::Buffer> {
        if self.fail_alloc == Some(label) {
            return Err(heq_hal::Error::out_of_memory(label));
        }
        self.inner.alloc_zeroed(label, words, access)
    }

    fn upload(&self, label: &str, data: &[u32], access: AccessMode) -> heq_hal::Result<Self::Buffer> {
        self.inner.upload(label, data, access)
    }

    fn dispatch(&self, program: &Self::Program, args: StageArgs<'_, Self::Buffer>) -> heq_hal::Result<()> {
        if self.fail_stage == Some(args.stage()) {
            return Err(heq_hal::Error::DeviceError("device lost".into()));
        }
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        self.inner.dispatch(program, args)
    }

    fn barrier(&self) -> heq_hal::Result<()> {
        self.inner.barrier()
    }

    fn read(&self, buffer: &Self::Buffer) -> heq_hal::Result<Vec<u32>> {
        self.inner.read(buffer)
    }
}

#[test]
fn test_program_build_failure_fails_before_any_stage() {
    let ctx = Faulty {
        fail_build: true,
        ..Faulty::new()
    };
    let config = cpu_config();
    let mut pipeline = Pipeline::new(&ctx, &config);
    let err = pipeline.run(&random_u8(8, 8, 1)).unwrap_err();
    assert!(matches!(err, Error::ProgramPreparation(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(ctx.dispatched.load(Ordering::SeqCst), 0);
}

#[test]
fn test_allocation_failure_is_resource_exhaustion() {
    let ctx = Faulty {
        fail_alloc: Some("lut"),
        ..Faulty::new()
    };
    let config = cpu_config();
    let mut pipeline = Pipeline::new(&ctx, &config);
    let err = pipeline.run(&random_u16(8, 8, 1)).unwrap_err();
    assert!(matches!(err, Error::ResourceExhausted(_)));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(ctx.dispatched.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stage_failure_stops_later_stages() {
    let ctx = Faulty {
        fail_stage: Some(Stage::Normalize),
        ..Faulty::new()
    };
    let config = cpu_config();
    let mut pipeline = Pipeline::new(&ctx, &config);
    let err = pipeline.run(&random_u8(8, 8, 1)).unwrap_err();
    assert!(matches!(err, Error::Stage { state: PipelineState::CumulativeReady, .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert_eq!(ctx.dispatched.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_run_does_not_affect_next_run() {
    let config = cpu_config();
    let broken = Faulty {
        fail_stage: Some(Stage::Histogram),
        ..Faulty::new()
    };
    let healthy = Faulty::new();
    let image = random_u8(20, 10, 4);

    let equalizer = Equalizer::new(config).unwrap();
    assert!(equalizer.run_on(&broken, &image).is_err());
    let after_failure = equalizer.run_on(&healthy, &image).unwrap();
    let fresh = equalizer.run(&image).unwrap();
    assert_eq!(after_failure.image, fresh.image);
    assert_eq!(after_failure.backend, "faulty");
}
