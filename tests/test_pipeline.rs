mod common;

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use common::{init_logging, scene_value, write_calibration, write_raw, RawSpec, WAVELENGTHS};
use hawkql::export::gridded::read_gridded;
use hawkql::export::npz::{read_npz, NpyData};
use hawkql::{ExportKind, HawkError, Pipeline, PipelineConfig, PipelineInputs};
use std::path::Path;
use tempfile::TempDir;

/// Write a standard scene into `dir` and return the pipeline inputs
fn scene_inputs(dir: &Path, spec: &RawSpec, output: &Path) -> PipelineInputs {
    let raw = write_raw(dir, "hawk_scene", spec, scene_value(spec.dark_start_line));
    let cal = write_calibration(dir, "hawk_cal", spec.pixels, &spec.wavelengths, 0.05, |_, _| 50.0);
    PipelineInputs::new(raw, cal, output, None).unwrap()
}

fn expected_radiance(line: usize, pixel_offset: f64, band: usize) -> f64 {
    if line >= 80 {
        0.0
    } else {
        (900.0 + 10.0 * band as f64 + pixel_offset + line as f64) * 10.0
    }
}

#[test]
fn test_end_to_end_quicklook() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("quicklooks");
    let inputs = scene_inputs(dir.path(), &RawSpec::default(), &output);

    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let report = pipeline.run(&inputs).unwrap();

    assert!(report.all_succeeded(), "{:?}", report);
    assert_eq!(report.outcomes.len(), 4);
    for name in [
        "hawk_scene.png",
        "hawk_scene_radiances.png",
        "hawk_scene_radiances.nc",
        "hawk_scene_spectra.npz",
    ] {
        assert!(output.join(name).is_file(), "missing {}", name);
    }

    let arrays = read_npz(output.join("hawk_scene_spectra.npz")).unwrap();
    assert_eq!(arrays["array"].shape, vec![100, 5]);
    assert_eq!(arrays["wvl"].data, NpyData::F64(WAVELENGTHS.to_vec()));

    // pixels 187..197 have (p % 7) averaging to 3.2
    if let NpyData::F64(values) = &arrays["array"].data {
        for (line, band) in [(0, 0), (10, 2), (79, 4), (80, 1), (99, 3)] {
            assert_relative_eq!(
                values[line * 5 + band],
                expected_radiance(line, 3.2, band),
                epsilon = 1e-6
            );
        }
    } else {
        panic!("spectra are not f8");
    }

    let start = Utc.with_ymd_and_hms(2019, 6, 19, 10, 15, 30).unwrap()
        + chrono::Duration::milliseconds(250);
    match &arrays["time"].data {
        NpyData::DateTimeUs(times) => {
            assert_eq!(times.len(), 100);
            assert_eq!(times[0], start.timestamp_micros());
            assert!(times.windows(2).all(|w| w[1] - w[0] == 50_000));
        }
        other => panic!("unexpected time array {:?}", other),
    }

    let series = read_gridded(output.join("hawk_scene_radiances.nc")).unwrap();
    assert_eq!(series.timestamps.len(), 100);
    assert_eq!(series.timestamps[0], start);
    assert_eq!(series.across_track_pixel, 192);
    let names: Vec<&str> = series.variables.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(names, vec!["rad_1200nm", "rad_1600nm", "rad_2200nm"]);

    // pixel 192 has p % 7 == 3; 1600 nm is band 2
    let rad_1600 = series.series("rad_1600nm").unwrap();
    assert_relative_eq!(rad_1600[5], expected_radiance(5, 3.0, 2), epsilon = 1e-6);
    assert_relative_eq!(rad_1600[90], 0.0, epsilon = 1e-9);
}

#[test]
fn test_radiance_keeps_raw_shape() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let spec = RawSpec {
        lines: 12,
        pixels: 9,
        dark_start_line: 8,
        ..Default::default()
    };
    let inputs = scene_inputs(dir.path(), &spec, &dir.path().join("out"));

    let product = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .calibrate(&inputs)
        .unwrap();
    assert_eq!(product.cube.dim(), (12, 9, 5));
    assert_eq!(product.timestamps.len(), 12);
    assert_eq!(product.wavelengths, WAVELENGTHS.to_vec());
}

#[test]
fn test_exports_are_reproducible() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let spec = RawSpec {
        lines: 40,
        pixels: 32,
        dark_start_line: 30,
        ..Default::default()
    };
    let config = PipelineConfig {
        image_size: (400, 200),
        ..Default::default()
    };
    let pipeline = Pipeline::new(config).unwrap();

    let first = scene_inputs(dir.path(), &spec, &dir.path().join("first"));
    let mut second = first.clone();
    second.output_dir = dir.path().join("second");

    assert!(pipeline.run(&first).unwrap().all_succeeded());
    assert!(pipeline.run(&second).unwrap().all_succeeded());

    for kind in ExportKind::ALL {
        let name = format!("hawk_scene{}", kind.suffix());
        let a = std::fs::read(first.output_dir.join(&name)).unwrap();
        let b = std::fs::read(second.output_dir.join(&name)).unwrap();
        assert!(a == b, "{} differs between runs", name);
    }
}

#[test]
fn test_failed_exporter_does_not_stop_the_others() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let spec = RawSpec {
        lines: 20,
        pixels: 16,
        dark_start_line: 15,
        ..Default::default()
    };
    let output = dir.path().join("out");
    let inputs = scene_inputs(dir.path(), &spec, &output);

    let config = PipelineConfig {
        across_track_pixel: Some(500),
        image_size: (300, 150),
        ..Default::default()
    };
    let report = Pipeline::new(config).unwrap().run(&inputs).unwrap();

    assert!(!report.all_succeeded());
    let failed: Vec<ExportKind> = report.failures().map(|o| o.kind).collect();
    assert_eq!(failed, vec![ExportKind::RadiancePlot, ExportKind::Gridded]);
    assert!(output.join("hawk_scene.png").is_file());
    assert!(output.join("hawk_scene_spectra.npz").is_file());
}

#[test]
fn test_disabled_exports_are_skipped() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let spec = RawSpec {
        lines: 10,
        pixels: 12,
        dark_start_line: 6,
        ..Default::default()
    };
    let output = dir.path().join("out");
    let inputs = scene_inputs(dir.path(), &spec, &output);

    let config = PipelineConfig {
        create_images: false,
        create_radiance_plots: false,
        create_netcdf: false,
        ..Default::default()
    };
    let report = Pipeline::new(config).unwrap().run(&inputs).unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].kind, ExportKind::SpectralSummary);
    assert!(!output.join("hawk_scene.png").exists());
    assert!(output.join("hawk_scene_spectra.npz").is_file());
}

#[test]
fn test_empty_dark_region_aborts() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let spec = RawSpec {
        lines: 10,
        pixels: 4,
        dark_start_line: 10,
        ..Default::default()
    };
    let output = dir.path().join("out");
    let inputs = scene_inputs(dir.path(), &spec, &output);

    let err = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&inputs)
        .unwrap_err();
    assert!(matches!(err, HawkError::DarkRegion(_)));
    assert!(!output.exists());
}

#[test]
fn test_misaligned_calibration_aborts() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let spec = RawSpec {
        lines: 10,
        pixels: 8,
        dark_start_line: 6,
        ..Default::default()
    };
    let raw = write_raw(dir.path(), "hawk_scene", &spec, scene_value(6));
    let cal = write_calibration(dir.path(), "hawk_cal", 6, &spec.wavelengths, 0.05, |_, _| 50.0);
    let inputs = PipelineInputs::new(raw, cal, dir.path().join("out"), None).unwrap();

    let err = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .calibrate(&inputs)
        .unwrap_err();
    assert!(matches!(err, HawkError::Alignment(_)));
}

#[test]
fn test_missing_calibration_is_an_input_error() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let spec = RawSpec {
        lines: 10,
        pixels: 4,
        dark_start_line: 6,
        ..Default::default()
    };
    let raw = write_raw(dir.path(), "hawk_scene", &spec, scene_value(6));
    let inputs = PipelineInputs::new(
        raw,
        dir.path().join("absent.cal"),
        dir.path().join("out"),
        Some(dir.path().join("absent.hdr")),
    )
    .unwrap();

    let err = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(&inputs)
        .unwrap_err();
    assert!(matches!(err, HawkError::Io(_)));
}
