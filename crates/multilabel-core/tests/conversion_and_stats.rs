mod common;

use std::io::Write;

use common::init_logger;
use multilabel_core::config::{load_config, ModelType};
use multilabel_core::convert::{convert_rows, is_missing, PredictionConverter, TrainingConverter};
use multilabel_core::io::{read_table, ReaderConfig};
use multilabel_core::mapper::ValueMapper;
use multilabel_core::math::Array2;
use multilabel_core::progress::{LogProgress, NeverCancel};
use multilabel_core::schema::{NominalPolicy, SchemaTranslator};
use multilabel_core::stats::{LabelsetStatistics, SignatureMode};
use multilabel_core::table::{Cell, ColumnSpec, Table, TableSpec};
use multilabel_core::threshold::{binarize, calibrate, label_cardinality, PolicyKind, ThresholdPolicy};

// ---------------------------------------------------------------------------
// Schema translation and conversion
// ---------------------------------------------------------------------------

#[test]
fn translation_is_independent_of_domain_order() {
    let a = TableSpec::new(vec![ColumnSpec::string("s").with_domain(["b", "c", "a"])]);
    let b = TableSpec::new(vec![ColumnSpec::string("s").with_domain(["c", "a", "b", "a"])]);

    let (mut ma, mut mb) = (ValueMapper::new(), ValueMapper::new());
    let sa = SchemaTranslator::default().translate(&a, &mut ma).unwrap();
    let sb = SchemaTranslator::default().translate(&b, &mut mb).unwrap();
    assert_eq!(sa, sb);
    assert_eq!(ma, mb);
    assert_eq!(sa.attribute(0).values(), &["a", "b", "c"]);
}

#[test]
fn nominal_values_round_trip_through_the_mapper() {
    let spec = TableSpec::new(vec![ColumnSpec::string("s").with_domain(["x", "y", "z"])]);
    let mut mapper = ValueMapper::new();
    let schema = SchemaTranslator::default().translate(&spec, &mut mapper).unwrap();
    let conv = PredictionConverter::new(&schema, &mapper);

    for value in ["x", "y", "z"] {
        let encoded = conv.convert_row(&[Cell::from(value)], None).unwrap()[0];
        let token = schema.attribute(0).value(encoded as usize).unwrap();
        assert_eq!(mapper.decode(token), Some(&Cell::from(value)));
    }
}

#[test]
fn missing_cells_propagate_through_training_conversion() {
    init_logger();
    let spec = TableSpec::new(vec![ColumnSpec::integer("n"), ColumnSpec::string("s")]);
    let table = Table::new(
        spec,
        vec![
            vec![Cell::Int(1), Cell::from("a")],
            vec![Cell::Missing, Cell::Missing],
            vec![Cell::Int(3)],
        ],
    );
    let mut mapper = ValueMapper::new();
    let mut schema = SchemaTranslator::new(NominalPolicy::Open)
        .translate(table.spec(), &mut mapper)
        .unwrap();
    let width = schema.len();
    let mut converter = TrainingConverter::new(&mut schema, &mut mapper);
    let progress = LogProgress::new("conversion");

    let features = convert_rows(
        table.rows(),
        width,
        Some(table.len()),
        &progress,
        &NeverCancel,
        |row| converter.convert_row(row, None),
    )
    .unwrap();
    assert_eq!(features.shape(), (3, 2));
    assert_eq!(features[(0, 0)], 1.0);
    assert!(is_missing(features[(1, 0)]) && is_missing(features[(1, 1)]));
    assert!(is_missing(features[(2, 1)]));
}

// ---------------------------------------------------------------------------
// Reader and configuration
// ---------------------------------------------------------------------------

#[test]
fn reads_delimited_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "x\tcolour\tlabel").unwrap();
    writeln!(file, "0.5\tred\t1").unwrap();
    writeln!(file, "?\tblue\t0").unwrap();

    let config = ReaderConfig {
        string_columns: vec!["label".into()],
        ..ReaderConfig::tsv()
    };
    let table = read_table(file.path(), &config).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.spec().column_names(), vec!["x", "colour", "label"]);
    assert_eq!(table.row(1)[0], Cell::Missing);
    assert!(table.spec().column(2).has_domain());

    assert!(read_table("/definitely/not/here.csv", &ReaderConfig::default()).is_err());
}

#[test]
fn loads_config_from_json() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "targets": ["l1", "l2"],
            "threshold": "PCutL",
            "nominal_policy": "open",
            "supervisor": {{ "poll_interval_ms": 100 }},
            "model": {{ "learning_rate": 0.05, "LabelPrior": {{ "smoothing": 1.0 }} }}
        }}"#
    )
    .unwrap();

    let config = load_config(file.path()).unwrap();
    assert_eq!(config.targets, vec!["l1", "l2"]);
    assert_eq!(config.threshold, PolicyKind::PCutL);
    assert_eq!(config.nominal_policy, NominalPolicy::Open);
    assert_eq!(config.supervisor.poll_interval_ms, 100);
    assert_eq!(config.supervisor.cancel_grace_ms, 3000);
    assert_eq!(config.model.model_type, ModelType::LabelPrior { smoothing: 1.0 });
    assert_eq!(config.signature, SignatureMode::Delimited);
}

#[test]
fn config_with_unknown_loss_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "model": {{ "learning_rate": 0.1, "GBDT": {{ "max_depth": 3, "num_boost_round": 5,
              "debug": false, "training_optimization_level": 2, "loss_type": "Hinge" }} }} }}"#
    )
    .unwrap();
    let err = load_config(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Hinge"));
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[test]
fn binarisation_is_monotone_in_the_threshold() {
    let scores = Array2::from_shape_vec((2, 3), vec![0.1, 0.5, 0.9, 0.3, 0.6, 0.2]).unwrap();
    let mut previous = usize::MAX;
    for t in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
        let positives = binarize(&scores, &ThresholdPolicy::Global(t))
            .as_slice()
            .iter()
            .filter(|&&v| v == 1)
            .count();
        assert!(positives <= previous);
        previous = positives;
    }
}

#[test]
fn pcut1_lands_within_one_step_of_true_cardinality() {
    let scores = Array2::from_shape_vec(
        (4, 3),
        vec![0.9, 0.8, 0.1, 0.7, 0.2, 0.3, 0.6, 0.65, 0.05, 0.15, 0.4, 0.35],
    )
    .unwrap();
    let truth = Array2::from_shape_vec((4, 3), vec![1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0]).unwrap();

    let cal = calibrate(&scores, &truth, PolicyKind::PCut1).unwrap();
    let gap = (label_cardinality(&cal.predictions) - label_cardinality(&truth)).abs();
    assert!(gap <= 1.0 / 4.0 + 1e-12);
    assert!(cal.degenerate.is_empty());
}

// ---------------------------------------------------------------------------
// Labelset statistics
// ---------------------------------------------------------------------------

/// l1, l2 (label strings), note (string), three numeric columns.
fn labelset_table() -> Table {
    let spec = TableSpec::new(vec![
        ColumnSpec::string("l1"),
        ColumnSpec::string("l2"),
        ColumnSpec::string("note"),
        ColumnSpec::double("a"),
        ColumnSpec::double("b"),
        ColumnSpec::double("c"),
    ]);
    let rows = (0..10)
        .map(|i| {
            let on = if i == 1 { "1" } else { "0" };
            let note = if i == 1 { "x" } else { "0" };
            vec![
                Cell::from(on),
                Cell::from(on),
                Cell::from(note),
                Cell::Double(i as f64),
                Cell::Double(i as f64 * 2.0),
                Cell::Double(1.0),
            ]
        })
        .collect();
    Table::new(spec, rows)
}

#[test]
fn labelset_statistics_of_single_positive_row() {
    let table = labelset_table();
    let stats = LabelsetStatistics::for_target(table.spec(), "l2", SignatureMode::Delimited).unwrap();
    let report = stats.compute(table.rows(), std::iter::empty());

    // Two label columns plus the string column count as label cells.
    assert_eq!(report.train.rows, 10);
    assert_eq!(report.train.labels_number, 3);
    assert_eq!(report.train.unique_labelsets, 2);
    assert!((report.train.cardinality - 0.3).abs() < 1e-12);
    assert!((report.train.density - 0.15).abs() < 1e-12);
    assert_eq!(report.combined, report.train);
}

#[test]
fn labelset_statistics_over_a_split() {
    let table = labelset_table();
    let (train, test) = table.split(0.5, 7);
    assert_eq!(train.len() + test.len(), 10);

    let stats = LabelsetStatistics::for_target(table.spec(), "l2", SignatureMode::Delimited).unwrap();
    let report = stats.compute(train.rows(), test.rows());
    assert_eq!(report.combined.rows, 10);
    assert_eq!(report.combined.labels_number, 3);
    assert_eq!(report.combined.unique_labelsets, 2);
    assert!(report.train.unique_labelsets >= 1 && report.test.unique_labelsets >= 1);

    assert!(LabelsetStatistics::for_target(table.spec(), "zzz", SignatureMode::Delimited).is_err());
}
