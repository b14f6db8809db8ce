//! Unit tests for gridzone
//!
//! Engine properties, table discipline, merging, configuration validation
//! and raster I/O, exercised through the public API.

use chrono::NaiveDate;
use geo::{polygon, MultiPolygon};
use gridzone::config::{GapFillConfig, PipelineConfig, Stage, YearRange};
use gridzone::discovery::find_tables;
use gridzone::engine::{zonal_mean, zonal_mean_split};
use gridzone::errors::PipelineError;
use gridzone::layer::{Feature, Geometry, GeometryLayer};
use gridzone::merge::{merge_files, MergeAccumulator, MergeStrategy, MergedTable};
use gridzone::naming::{GeometryKind, RasterKey};
use gridzone::parallel::{get_parallel_info, ParallelConfig};
use gridzone::raster::{Extent, GeoTransform, Raster};
use gridzone::report::{RunReport, StageReport, UnitOutcome};
use gridzone::stages::convert::convert_table;
use gridzone::stages::fill::fill_window;
use gridzone::table::{normalize, StatTable};
use ndarray::Array2;
use std::path::PathBuf;
use tempfile::tempdir;

const ND: f32 = -9999.0;

fn per_date(id: &str, column: &str, rows: &[(&str, &str)]) -> StatTable {
    let mut table = StatTable::new([id, column]);
    for (key, value) in rows {
        table
            .push_row(vec![key.to_string(), value.to_string()])
            .unwrap();
    }
    table
}

fn square(x0: f64, y0: f64, size: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: x0, y: y0),
        (x: x0 + size, y: y0),
        (x: x0 + size, y: y0 + size),
        (x: x0, y: y0 + size),
    ]])
}

#[test]
fn test_error_types() {
    let error = PipelineError::MissingColumn {
        column: "ID".to_string(),
        table: "a.csv".to_string(),
    };
    assert!(error.to_string().contains("ID"));
    assert!(error.to_string().contains("a.csv"));

    let error = PipelineError::Config("--points requires --point-field".to_string());
    assert!(error.to_string().contains("--point-field"));

    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: PipelineError = io_error.into();
    assert!(matches!(error, PipelineError::Io(_)));
}

#[test]
fn test_parallel_config() {
    let config = ParallelConfig::default();
    assert_eq!(config.num_threads, None);
    assert!(config.current_threads() > 0);

    let info = get_parallel_info();
    assert!(info.available_cores > 0);
    assert!(info.current_threads > 0);
}

#[test]
fn test_gap_fill_window_fills_inside_only() {
    // 6x6 one-degree raster with a 2x2 hole at rows 2..4, cols 2..4 and a
    // nodata cell outside the window at (0, 0)
    let mut data = Array2::from_elem((6, 6), 1.0_f32);
    for row in 2..4 {
        for col in 2..4 {
            data[[row, col]] = ND;
        }
    }
    data[[0, 0]] = ND;
    let raster = Raster::new(data, GeoTransform::new(0.0, 6.0, 1.0, 1.0), ND);

    // finer fill raster covering the whole area
    let fill = Raster::new(
        Array2::from_elem((12, 12), 7.0_f32),
        GeoTransform::new(0.0, 6.0, 0.5, 0.5),
        ND,
    );
    let window = Extent::new(1.0, 1.0, 5.0, 5.0).unwrap();
    let filled = fill_window(&raster, &fill, &window).unwrap();

    assert_eq!(filled.data.dim(), raster.data.dim());
    for ((row, col), &value) in filled.data.indexed_iter() {
        let (x, y) = filled.transform.cell_center(row, col);
        let original = raster.data[[row, col]];
        if window.contains(x, y) {
            assert!(!filled.is_nodata(value), "nodata left at ({row}, {col})");
            if original != ND {
                assert_eq!(value, original);
            } else {
                assert_eq!(value, 7.0);
            }
        } else {
            assert_eq!(value, original);
        }
    }
    assert_eq!(filled.data[[0, 0]], ND);
}

#[test]
fn test_gap_fill_window_outside_raster_is_an_error() {
    let raster = Raster::new(
        Array2::from_elem((2, 2), 1.0_f32),
        GeoTransform::new(0.0, 2.0, 1.0, 1.0),
        ND,
    );
    let window = Extent::new(10.0, 10.0, 12.0, 12.0).unwrap();
    assert!(fill_window(&raster, &raster, &window).is_err());
}

#[test]
fn test_split_zonal_means_equal_unsplit() {
    let values: Vec<f32> = (0..64).map(|v| v as f32).collect();
    let mut data = Array2::from_shape_vec((8, 8), values).unwrap();
    data[[1, 1]] = ND;
    let raster = Raster::new(data, GeoTransform::new(0.0, 8.0, 1.0, 1.0), ND);

    let mut layer = GeometryLayer::new("zones", GeometryKind::Polygon);
    let zones = [
        ("Z3", "east", square(4.0, 4.0, 4.0)),
        ("Z1", "west", square(0.0, 4.0, 4.0)),
        ("Z2", "west", square(0.0, 0.0, 4.0)),
        ("Z4", "east", square(4.0, 0.0, 2.5)),
    ];
    for (zone, region, shape) in zones {
        layer
            .push(
                Feature::new(Geometry::Polygon(shape))
                    .with_attribute("ZONE", zone)
                    .with_attribute("REGION", region),
            )
            .unwrap();
    }

    let whole = zonal_mean(&raster, &layer, "ZONE").unwrap();
    let split = zonal_mean_split(&raster, &layer, "ZONE", "REGION").unwrap();
    assert_eq!(whole, split);

    let order: Vec<&str> = split.iter().map(|s| s.zone.as_str()).collect();
    assert_eq!(order, ["Z3", "Z1", "Z2", "Z4"]);
    // Z1 covers rows 0..4, cols 0..4 with (1, 1) nodata
    assert_eq!(whole[1].count, 15);
}

#[test]
fn test_outer_join_merge_fills_nulls() {
    let first = per_date("ID", "d2000_01_01", &[("A", "1"), ("B", "2")]);
    let second = per_date("ID", "d2000_01_02", &[("A", "3"), ("C", "4")]);

    let merged = MergedTable::merge(
        "ID",
        [("a.csv", first), ("b.csv", second)],
        MergeStrategy::OuterJoin,
    )
    .unwrap();
    assert_eq!(merged.ids, ["A", "B", "C"]);

    let wide = merged.to_wide();
    assert_eq!(wide.headers, ["ID", "d2000_01_01", "d2000_01_02"]);
    assert_eq!(wide.rows[0], ["A", "1", "3"]);
    assert_eq!(wide.rows[1], ["B", "2", ""]);
    assert_eq!(wide.rows[2], ["C", "", "4"]);
}

#[test]
fn test_append_merge_matches_outer_join() {
    let tables = || {
        [
            ("a.csv", per_date("ID", "d2000_01_01", &[("A", "1"), ("B", "2")])),
            ("b.csv", per_date("ID", "d2000_01_02", &[("C", "4"), ("A", "3")])),
        ]
    };
    let joined = MergedTable::merge("ID", tables(), MergeStrategy::OuterJoin).unwrap();
    let appended = MergedTable::merge("ID", tables(), MergeStrategy::Append).unwrap();
    assert_eq!(appended, joined);
    assert_eq!(appended.ids, ["A", "B", "C"]);
    assert_eq!(
        appended.values[2],
        vec![None, Some("4".to_string())],
        "new identifiers are null in earlier columns"
    );
}

#[test]
fn test_append_merge_accumulates_by_column_name() {
    let west = per_date("ID", "d2000_01_01", &[("A", "1")]);
    let east = per_date("ID", "d2000_01_01", &[("B", "2"), ("A", "9")]);

    let mut acc = MergeAccumulator::new("ID", MergeStrategy::Append);
    acc.push("west.csv", west.clone()).unwrap();
    acc.push("east.csv", east.clone()).unwrap();
    let merged = acc.finish();
    assert_eq!(merged.columns, ["d2000_01_01"]);
    assert_eq!(merged.to_wide().rows, vec![vec!["A", "1"], vec!["B", "2"]]);

    let result = MergedTable::merge(
        "ID",
        [("west.csv", west), ("east.csv", east)],
        MergeStrategy::OuterJoin,
    );
    assert!(matches!(result, Err(PipelineError::ColumnDiscipline { .. })));
}

#[test]
fn test_tables_merge_in_date_order_for_unpadded_names() {
    let dir = tempdir().expect("Failed to create temp dir");
    // lexically "10" sorts before "2_"
    per_date("ID", "d2000_10_01", &[("A", "2")])
        .write_csv(&dir.path().join("prate_2000_10_01_pt.csv"))
        .unwrap();
    per_date("ID", "d2000_02_01", &[("A", "1")])
        .write_csv(&dir.path().join("prate_2000_2_1_pt.csv"))
        .unwrap();

    let tables = find_tables(dir.path(), "prate", GeometryKind::Point, false).unwrap();
    let dates: Vec<NaiveDate> = tables.iter().map(|(name, _)| name.key.date).collect();
    assert_eq!(
        dates,
        [
            NaiveDate::from_ymd_opt(2000, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2000, 10, 1).unwrap()
        ]
    );

    let paths: Vec<PathBuf> = tables.into_iter().map(|(_, path)| path).collect();
    let merged = merge_files(&paths, "ID", MergeStrategy::Append).unwrap();
    assert_eq!(merged.columns, ["d2000_02_01", "d2000_10_01"]);
}

#[test]
fn test_merge_rejects_undisciplined_tables() {
    let first = per_date("ID", "d2000_01_01", &[("A", "1")]);
    let duplicate = per_date("ID", "d2000_01_01", &[("A", "2")]);
    let result = MergedTable::merge(
        "ID",
        [("a.csv", first.clone()), ("b.csv", duplicate)],
        MergeStrategy::OuterJoin,
    );
    assert!(matches!(result, Err(PipelineError::ColumnDiscipline { .. })));

    let other_id = per_date("SITE", "d2000_01_02", &[("A", "2")]);
    let result = MergedTable::merge(
        "ID",
        [("a.csv", first), ("c.csv", other_id)],
        MergeStrategy::OuterJoin,
    );
    assert!(matches!(result, Err(PipelineError::MissingColumn { .. })));

    let mut wide = StatTable::new(["ID", "d2000_01_03", "extra"]);
    wide.push_row(vec!["A".into(), "1".into(), "x".into()]).unwrap();
    let result = MergedTable::merge("ID", [("d.csv", wide)], MergeStrategy::OuterJoin);
    assert!(matches!(result, Err(PipelineError::ColumnDiscipline { .. })));
}

#[test]
fn test_long_output() {
    let first = per_date("ID", "d2000_01_01", &[("A", "1"), ("B", "2")]);
    let second = per_date("ID", "d2000_01_02", &[("A", "3")]);
    let merged = MergedTable::merge(
        "ID",
        [("a.csv", first), ("b.csv", second)],
        MergeStrategy::OuterJoin,
    )
    .unwrap();

    let long = merged.to_long();
    assert_eq!(long.headers, ["ID", "date", "value"]);
    assert_eq!(
        long.rows,
        vec![
            vec!["A", "2000-01-01", "1"],
            vec!["A", "2000-01-02", "3"],
            vec!["B", "2000-01-01", "2"],
            vec!["B", "2000-01-02", ""],
        ]
    );
}

#[test]
fn test_normalize_keeps_identifier_and_statistic() {
    let mut raw = StatTable::new(["FID", "SITE", "ELEV", "RASTERVALU"]);
    raw.push_row(vec!["0".into(), "P1".into(), "12".into(), "3.5".into()])
        .unwrap();
    let (table, missing) = normalize(&raw, "SITE", "RASTERVALU", "d2000_01_01", "t").unwrap();
    assert_eq!(table.headers, ["SITE", "d2000_01_01"]);
    assert_eq!(table.rows, vec![vec!["P1", "3.5"]]);
    assert!(missing.is_empty());

    let result = normalize(&raw, "NAME", "RASTERVALU", "d2000_01_01", "t");
    assert!(matches!(
        result,
        Err(PipelineError::MissingColumn { ref column, .. }) if column == "NAME"
    ));
}

#[test]
fn test_convert_table_writes_per_date_csv() {
    let dir = tempdir().expect("Failed to create temp dir");
    let key = RasterKey::new("prate", NaiveDate::from_ymd_opt(1995, 3, 7).unwrap());
    let raw_path = dir.path().join(key.table_file_name(GeometryKind::Polygon, true));
    let target = dir.path().join(key.table_file_name(GeometryKind::Polygon, false));
    assert_eq!(
        target.file_name().unwrap().to_str().unwrap(),
        "prate_1995_03_07_pg.csv"
    );

    let mut raw = StatTable::new(["OID", "ZONE", "COUNT", "AREA", "MEAN"]);
    raw.push_row(vec![
        "1".into(),
        "Z1".into(),
        "4".into(),
        "0.0064".into(),
        "2.25".into(),
    ])
    .unwrap();
    raw.write_csv(&raw_path).unwrap();

    convert_table(&raw_path, &target, &key, GeometryKind::Polygon, "ZONE").unwrap();
    let written = StatTable::read_csv(&target).unwrap();
    assert_eq!(written.headers, ["ZONE", "d1995_03_07"]);
    assert_eq!(written.rows, vec![vec!["Z1", "2.25"]]);

    let missing = dir.path().join("other.csv");
    let result = convert_table(&raw_path, &missing, &key, GeometryKind::Polygon, "REGION");
    assert!(result.is_err());
    assert!(!missing.exists());
}

#[test]
fn test_config_validation() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut config = PipelineConfig::new(dir.path(), dir.path());
    assert!(config.validate(&[Stage::Extract]).is_ok());

    assert!(YearRange::from_bounds(Some(2001), Some(2000)).is_err());
    assert_eq!(
        YearRange::from_bounds(None, Some(2003)).unwrap(),
        Some(YearRange {
            start: 2003,
            end: 2003
        })
    );

    // statistics need a layer with its identifier field
    assert!(matches!(
        config.validate(&[Stage::Stats]),
        Err(PipelineError::Config(_))
    ));
    config.points.path = Some(dir.path().join("sites.shp"));
    assert!(matches!(
        config.validate(&[Stage::Stats]),
        Err(PipelineError::Config(_))
    ));
    config.points.id_field = Some("SITE".to_string());
    assert!(matches!(
        config.validate(&[Stage::Stats]),
        Err(PipelineError::NotFound(_))
    ));

    // merge needs at least one identifier field
    let mut merge_config = PipelineConfig::new(dir.path(), dir.path());
    assert!(merge_config.validate(&[Stage::Merge]).is_err());
    merge_config.polygons.id_field = Some("ZONE".to_string());
    assert!(merge_config.validate(&[Stage::Merge]).is_ok());
    merge_config.polygons.id_field = Some("MEAN".to_string());
    assert!(merge_config.validate(&[Stage::Merge]).is_err());

    // identifier fields may not shadow the columns the engine writes
    for field in ["AREA", "COUNT", "OID"] {
        merge_config.polygons.id_field = Some(field.to_string());
        assert!(matches!(
            merge_config.validate(&[Stage::Extract]),
            Err(PipelineError::Config(_))
        ));
    }
    merge_config.polygons.id_field = Some("ZONE".to_string());
    merge_config.points.id_field = Some("FID".to_string());
    assert!(matches!(
        merge_config.validate(&[Stage::Merge]),
        Err(PipelineError::Config(_))
    ));

    // gap filling needs an existing fill raster
    let mut fill_config = PipelineConfig::new(dir.path(), dir.path());
    assert!(fill_config.validate(&[Stage::Fill]).is_err());
    fill_config.gap_fill = Some(GapFillConfig {
        fill_raster: PathBuf::from("/nonexistent/fill.tif"),
        window: Extent::new(0.0, 0.0, 1.0, 1.0).unwrap(),
    });
    assert!(matches!(
        fill_config.validate(&[Stage::Fill]),
        Err(PipelineError::NotFound(_))
    ));

    let mut bad_variable = PipelineConfig::new(dir.path(), dir.path());
    bad_variable.variable = "air_temp".to_string();
    assert!(bad_variable.validate(&[Stage::Extract]).is_err());
}

#[test]
fn test_geotiff_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("prate_2000_01_01.tif");

    let data = Array2::from_shape_vec((2, 3), vec![1.5, 2.5, ND, 4.0, 5.0, 6.25]).unwrap();
    let raster = Raster::new(data, GeoTransform::new(-180.0, 90.0, 0.5, 0.25), ND);
    raster.write_geotiff(&path).unwrap();
    assert!(!dir.path().join("prate_2000_01_01.tif.part").exists());

    let read = Raster::read_geotiff(&path).unwrap();
    assert_eq!(read.data, raster.data);
    assert_eq!(read.transform, raster.transform);
    assert_eq!(read.nodata, ND);
    assert_eq!(read.nodata_count(), 1);
    assert_eq!(read.value_at(-179.9, 89.9), Some(1.5));
    assert_eq!(read.value_at(-179.0, 89.9), None);
}

#[test]
fn test_run_report() {
    let mut stage = StageReport::new("convert");
    stage.record("a.raw.csv", UnitOutcome::Done);
    stage.record("b.raw.csv", UnitOutcome::Skipped);
    stage.record_result(
        "c.raw.csv",
        Err(PipelineError::Config("broken".to_string())),
    );
    assert_eq!((stage.done, stage.skipped, stage.failed), (1, 1, 1));
    assert_eq!(stage.failures().count(), 1);

    let mut report = RunReport::default();
    report.push(stage);
    assert!(report.has_failures());

    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("report.json");
    report.write_json(&path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let units = &json["stages"][0]["units"];
    assert_eq!(units[0]["status"], "done");
    assert_eq!(units[1]["status"], "skipped");
    assert_eq!(units[2]["status"], "failed");
    assert_eq!(units[2]["unit"], "c.raw.csv");
}
