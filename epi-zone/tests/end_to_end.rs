use epi_zone::prelude::*;
use epi_zone::segment::segment_apical_in;
use epi_zone::zone::generate_apical_in_zones;
use ndarray::{s, Array2, Array3};

fn init_logger() {
    let _ = simple_logger::init_with_level(log::Level::Warn);
}

fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("roi_data"), OpenMode::Create).unwrap();
    (dir, store)
}

/// 100x100 图像中 `[20, 80)` 的最大强度方块, 中央 `[40, 60)` 挖空.
fn hollow_square() -> Array3<u16> {
    let mut raw = Array3::<u16>::zeros((100, 100, 3));
    raw.slice_mut(s![20..80, 20..80, ..]).fill(u16::MAX);
    raw.slice_mut(s![40..60, 40..60, ..]).fill(0);
    raw
}

fn count(a: &Array2<bool>) -> usize {
    a.iter().filter(|v| **v).count()
}

#[test]
fn all_zero_apical_out_roi() {
    init_logger();
    let (_dir, store) = open_store();
    let cfg = PipelineConfig::default();
    let roi = RoiId::parse("mix_1", "blank_out_1").unwrap();
    ingest_raw(&store, &roi, &Array3::zeros((100, 100, 3)), &cfg).unwrap();

    let rec = process_roi(&store, &roi, &cfg).unwrap();
    let mask: Array2<bool> = store.read(&roi.segmentation_key("mask")).unwrap();
    assert_eq!(count(&mask), 0);
    assert_eq!(rec.whole.pixels, 0);
    assert_eq!(rec.whole.area, 0.0);
    assert_eq!(rec.whole.channels[0].sum, 0);
    assert_eq!(rec.whole.channels[1].sum, 0);
    assert_eq!(rec.outer.pixels, 0);
    assert!(rec.inner.is_none());
}

#[test]
fn hollow_square_apical_in_roi() {
    init_logger();
    let (_dir, store) = open_store();
    let cfg = PipelineConfig::default().with_zone_thickness(5, 5);
    let roi = RoiId::parse("mix_2", "sq_in_1").unwrap();
    ingest_raw(&store, &roi, &hollow_square(), &cfg).unwrap();

    let seg = segment_apical_in(&store, &roi, &cfg).unwrap();
    assert!(seg.largest_hole[[50, 50]]);
    assert!(!seg.mask[[50, 50]]);
    assert!(seg.mask[[30, 30]]);
    assert!(!seg.mask[[5, 5]]);
    assert!(!seg.largest_hole[[5, 5]]);

    let zones = generate_apical_in_zones(&store, &roi, &cfg).unwrap();
    let mask = &seg.mask;
    for (o, i, m) in itertools::izip!(zones.outer.iter(), zones.inner.iter(), mask.iter()) {
        assert!(!(*o && *i));
        assert!(!*o || *m);
        assert!(!*i || *m);
    }
    assert!(zones.outer[[20, 50]]);
    assert!(!zones.outer[[30, 50]]);
    assert!(zones.inner[[37, 50]]);
    assert!(count(&zones.inner) > 0);

    // 重跑得到逐位一致的结果.
    let keys = [
        roi.segmentation_key("primitive_mask"),
        roi.segmentation_key("largest_hole"),
        roi.segmentation_key("mask"),
        roi.zone_key("outer"),
        roi.zone_key("inner"),
    ];
    let before: Vec<Array2<bool>> = keys.iter().map(|k| store.read(k).unwrap()).collect();
    run_segmentation(&store, &roi, &cfg).unwrap();
    run_zoning(&store, &roi, &cfg).unwrap();
    let after: Vec<Array2<bool>> = keys.iter().map(|k| store.read(k).unwrap()).collect();
    assert_eq!(before, after);

    let rec = run_analysis(&store, &roi, &cfg).unwrap();
    let inner = rec.inner.unwrap();
    assert_eq!(inner.pixels, count(&zones.inner) as u64);
    assert_eq!(inner.area, inner.pixels as f64 * 0.325);
    assert!(inner.channels[0].sum <= inner.pixels * u16::MAX as u64);
    assert!(inner.channels[0].mean.is_some());
}

#[test]
fn correlation_over_store() {
    init_logger();
    let (_dir, store) = open_store();
    let cfg = PipelineConfig::default().with_zone_thickness(5, 5);
    let oracle = IntensityOracle { threshold: 0 };

    let roi_in = RoiId::parse("mix_1", "c_in_1").unwrap();
    let roi_out = RoiId::parse("mix_2", "c_out_1").unwrap();
    ingest_raw(&store, &roi_in, &hollow_square(), &cfg).unwrap();
    ingest_raw(&store, &roi_out, &hollow_square(), &cfg).unwrap();

    let rois = list_rois(&store).unwrap();
    assert_eq!(rois, [roi_in.clone(), roi_out.clone()]);

    let reports = fan_out(&rois, |roi| {
        process_roi(&store, roi, &cfg)?;
        run_nuclei(&store, roi, &oracle, &cfg)?;
        run_correlation(&store, roi, &cfg)
    });
    assert!(reports.iter().all(|r| r.is_ok()));

    let recs_in = reports[0].outcome.as_ref().unwrap();
    let zones: Vec<&str> = recs_in.iter().map(|r| r.zone.as_str()).collect();
    assert_eq!(zones, ["whole_roi", "apical", "basal"]);
    // 两个标记物通道完全相同.
    assert!(recs_in
        .iter()
        .all(|r| r.correlation == 0.0 || (r.correlation - 1.0).abs() < 1e-12));
    assert!(recs_in.iter().all(|r| r.nuclei <= 1));

    let recs_out = reports[1].outcome.as_ref().unwrap();
    assert_eq!(recs_out.len(), 2);
    // apical-out 组织恰好是方环, 强度处处相同, 方差为 0, 相关系数按 0 处理.
    assert!(recs_out.iter().all(|r| r.correlation == 0.0));
    assert_eq!(recs_out[0].nuclei, 1);
    assert_eq!(recs_out[0].pixels, 3200);
    let row = recs_out[0].to_row();
    assert_eq!(row[1].1, "mix_2");
    assert!(row.iter().any(|(c, _)| c == "HER2_HER3_correlation"));
}
