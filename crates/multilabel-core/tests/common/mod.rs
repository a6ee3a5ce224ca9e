#![allow(dead_code)]

use multilabel_core::config::{CoreConfig, ModelConfig, ModelType, SupervisorConfig};
use multilabel_core::table::{Cell, ColumnSpec, Table, TableSpec};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// x, colour, l1 ("0"/"1", positive when x > 0.5), l2 (0/1, positive for red).
pub fn training_table() -> Table {
    let colours = ["red", "green", "blue"];
    let rows = (0..12)
        .map(|i| {
            let x = i as f64 / 11.0;
            let colour = colours[i % 3];
            vec![
                Cell::Double(x),
                Cell::from(colour),
                Cell::from(if x > 0.5 { "1" } else { "0" }),
                Cell::Int(i64::from(colour == "red")),
            ]
        })
        .collect();
    let spec = TableSpec::new(vec![
        ColumnSpec::double("x"),
        ColumnSpec::string("colour"),
        ColumnSpec::string("l1"),
        ColumnSpec::integer("l2"),
    ]);
    Table::new(spec, rows).with_computed_domains()
}

pub fn config(model_type: ModelType) -> CoreConfig {
    CoreConfig {
        model: ModelConfig::new(0.1, model_type),
        targets: vec!["l1".to_string(), "l2".to_string()],
        supervisor: SupervisorConfig {
            poll_interval_ms: 10,
            cancel_grace_ms: 200,
        },
        ..CoreConfig::default()
    }
}

pub fn small_gbdt() -> ModelType {
    ModelType::GBDT {
        max_depth: 3,
        num_boost_round: 5,
        debug: false,
        training_optimization_level: 2,
        loss_type: "LogLikelyhood".to_string(),
    }
}
