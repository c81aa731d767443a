mod common;

use std::sync::Arc;

use common::{MemorySource, data_sources, drain, ints, kernel};
use rstest::rstest;
use sharding_core::config::props::ConfigProps;
use sharding_core::merge::DatabaseDialect;
use sharding_core::statement::LogicSql;
use sharding_core::statement::dml::DeleteStatement;
use sharding_core::statement::insert::{InsertStatement, InsertValueRow};
use sharding_core::statement::segment::{ColumnSegment, ExprSegment, Predicate, TableSegment};
use sharding_core::statement::select::{
    AggregationKind,
    OrderByItem,
    PaginationSegment,
    PaginationStyle,
    PaginationValueSegment,
    Projection,
    ProjectionsSegment,
    SelectStatement,
};
use sharding_core::value::ScalarValue;
use sharding_error::ErrorKind;

fn order_by_limit() -> LogicSql {
    let sql = "SELECT order_id FROM t_order ORDER BY order_id LIMIT 1, 2";
    let stmt = SelectStatement {
        tables: vec![TableSegment::new("t_order", 21)],
        projections: ProjectionsSegment {
            start: 7,
            stop: 14,
            distinct_row: false,
            items: vec![Projection::column("order_id", 7)],
        },
        order_by: vec![OrderByItem::asc("order_id")],
        pagination: Some(PaginationSegment {
            style: PaginationStyle::Limit,
            offset: Some(PaginationValueSegment::literal(1, 53, 53)),
            row_count: Some(PaginationValueSegment::literal(2, 56, 56)),
        }),
        ..Default::default()
    };
    LogicSql::new(sql, stmt, Vec::new())
}

#[tokio::test]
async fn order_by_limit_across_shards() {
    let ds_0 = Arc::new(
        MemorySource::new()
            .with_table("t_order_0", &["order_id"], ints(&[2, 4, 6]))
            .with_table("t_order_1", &["order_id"], ints(&[1, 3])),
    );
    let ds_1 = Arc::new(
        MemorySource::new()
            .with_table("t_order_0", &["order_id"], ints(&[8]))
            .with_table("t_order_1", &["order_id"], ints(&[5, 7])),
    );
    let sources = data_sources(vec![("ds_0", ds_0.clone()), ("ds_1", ds_1.clone())]);

    let kernel = kernel(ConfigProps::default(), DatabaseDialect::MySql);
    let merged = kernel.execute_query(&sources, order_by_limit()).await.unwrap();
    assert_eq!(ints(&[2, 3]), drain(merged, 1));

    assert_eq!(
        vec![
            "SELECT order_id FROM t_order_0 ORDER BY order_id LIMIT 0, 3",
            "SELECT order_id FROM t_order_1 ORDER BY order_id LIMIT 0, 3",
        ],
        ds_0.executed_sql()
    );
    assert_eq!(2, ds_1.executed_sql().len());
}

#[tokio::test]
async fn avg_is_recomputed_from_derived_columns() {
    let labels = ["AVG(price)", "AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0"];
    let row = |avg: ScalarValue, count: i64, sum: ScalarValue| vec![vec![avg, count.into(), sum]];
    let ds_0 = Arc::new(
        MemorySource::new()
            .with_table("t_order_0", &labels, row(5.into(), 2, 10.into()))
            .with_table("t_order_1", &labels, row(1.into(), 1, 1.into())),
    );
    let ds_1 = Arc::new(
        MemorySource::new()
            .with_table("t_order_0", &labels, row(4.into(), 1, 4.into()))
            .with_table("t_order_1", &labels, row(ScalarValue::Null, 0, ScalarValue::Null)),
    );
    let sources = data_sources(vec![("ds_0", ds_0), ("ds_1", ds_1)]);

    // SELECT AVG(price) FROM t_order
    let stmt = SelectStatement {
        tables: vec![TableSegment::new("t_order", 23)],
        projections: ProjectionsSegment {
            start: 7,
            stop: 16,
            distinct_row: false,
            items: vec![Projection::aggregation(AggregationKind::Avg, false, "price", "AVG(price)", 7)],
        },
        ..Default::default()
    };
    let kernel = kernel(ConfigProps::default(), DatabaseDialect::MySql);
    let merged = kernel
        .execute_query(&sources, LogicSql::new("SELECT AVG(price) FROM t_order", stmt, Vec::new()))
        .await
        .unwrap();
    assert_eq!(vec![vec![ScalarValue::Float64(3.75)]], drain(merged, 1));
}

#[tokio::test]
async fn encrypted_column_round_trip() {
    let kernel = kernel(ConfigProps::default(), DatabaseDialect::MySql);
    let phone = kernel
        .rule()
        .encrypt_rule()
        .find_column("t_user", "phone")
        .unwrap()
        .encryptor
        .encrypt(&"13800000000".into())
        .unwrap();
    let ds_1 = Arc::new(MemorySource::new().with_table("t_user", &["phone"], vec![vec![phone]]));
    let sources = data_sources(vec![("ds_0", Arc::new(MemorySource::new())), ("ds_1", ds_1.clone())]);

    // SELECT phone FROM t_user WHERE user_id = 1
    let stmt = SelectStatement {
        tables: vec![TableSegment::new("t_user", 18)],
        projections: ProjectionsSegment {
            start: 7,
            stop: 11,
            distinct_row: false,
            items: vec![Projection::column("phone", 7)],
        },
        where_predicate: Some(Predicate::eq(
            ColumnSegment::new("user_id", 31),
            ExprSegment::literal(1, 41, 41),
        )),
        ..Default::default()
    };
    let logic_sql = LogicSql::new("SELECT phone FROM t_user WHERE user_id = 1", stmt, Vec::new());
    let merged = kernel.execute_query(&sources, logic_sql).await.unwrap();

    assert_eq!(vec![vec![ScalarValue::from("13800000000")]], drain(merged, 1));
    assert_eq!(
        vec!["SELECT phone_cipher AS phone FROM t_user WHERE user_id = 1"],
        ds_1.executed_sql()
    );
}

#[test]
fn insert_parameters_align_with_markers() {
    let sql = "INSERT INTO t_order (user_id, status) VALUES (?, ?), (?, ?), (?, ?)";
    let row = |param: usize, start: usize| {
        InsertValueRow::new(
            vec![ExprSegment::parameter(param, start + 1), ExprSegment::parameter(param + 1, start + 4)],
            start,
            start + 5,
        )
    };
    let stmt = InsertStatement::values(
        TableSegment::new("t_order", 12),
        vec![ColumnSegment::new("user_id", 21), ColumnSegment::new("status", 30)],
        36,
        vec![row(0, 45), row(2, 53), row(4, 61)],
    );
    let params: Vec<ScalarValue> = vec![
        1.into(),
        "a".into(),
        2.into(),
        "b".into(),
        3.into(),
        "c".into(),
    ];

    let kernel = kernel(ConfigProps::default(), DatabaseDialect::MySql);
    let ctx = kernel.prepare(LogicSql::new(sql, stmt, params)).unwrap();
    assert!(!ctx.units.is_empty());
    let mut total_rows = 0;
    for unit in &ctx.units {
        let markers = unit.sql_unit.sql.matches('?').count();
        assert_eq!(markers, unit.sql_unit.parameters.len(), "{unit}");
        total_rows += unit.sql_unit.parameters.len() / 3;
    }
    assert_eq!(3, total_rows);
}

#[tokio::test]
async fn broadcast_delete_sums_affected_rows() {
    let sources = data_sources(vec![
        ("ds_0", Arc::new(MemorySource::new().with_affected(3))),
        ("ds_1", Arc::new(MemorySource::new().with_affected(4))),
    ]);
    let delete = DeleteStatement {
        tables: vec![TableSegment::new("t_config", 12)],
        where_predicate: None,
    };
    let kernel = kernel(ConfigProps::default(), DatabaseDialect::MySql);
    let affected = kernel
        .execute_update(&sources, LogicSql::new("DELETE FROM t_config", delete, Vec::new()))
        .await
        .unwrap();
    assert_eq!(7, affected);
}

#[tokio::test]
async fn missing_data_source_fails_statement() {
    let sources = data_sources(vec![("ds_0", Arc::new(MemorySource::new().with_affected(1)))]);
    let delete = DeleteStatement {
        tables: vec![TableSegment::new("t_config", 12)],
        where_predicate: None,
    };
    let kernel = kernel(ConfigProps::default(), DatabaseDialect::MySql);
    let err = kernel
        .execute_update(&sources, LogicSql::new("DELETE FROM t_config", delete, Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(ErrorKind::Execution, err.kind());
    assert_eq!(Some("ds_1"), err.field("data_source"));
}

#[rstest]
#[case(0, "ds_0")]
#[case(1, "ds_1")]
#[case(7, "ds_1")]
#[case(10, "ds_0")]
fn user_lookup_routes_to_one_data_source(#[case] user_id: i64, #[case] expected: &str) {
    let kernel = kernel(ConfigProps::default(), DatabaseDialect::MySql);
    let sql = "SELECT * FROM t_user WHERE user_id = ?";
    let stmt = SelectStatement {
        tables: vec![TableSegment::new("t_user", 14)],
        where_predicate: Some(Predicate::eq(ColumnSegment::new("user_id", 27), ExprSegment::parameter(0, 37))),
        ..Default::default()
    };
    let logic_sql = LogicSql::new(sql, stmt, vec![user_id.into()]);

    let first = kernel.route(logic_sql.clone()).unwrap();
    let second = kernel.route(logic_sql).unwrap();
    assert_eq!(first.route_result, second.route_result);
    assert_eq!(1, first.units().len());
    assert_eq!(expected, first.units()[0].data_source.actual_name);
}

#[test]
fn sql_show_prepares_and_logs() {
    logutil::init_test();
    let props = ConfigProps::try_from_pairs([("sql_show", "true"), ("max_connections_size_per_query", "2")]).unwrap();
    let kernel = kernel(props, DatabaseDialect::MySql);
    let ctx = kernel.prepare(order_by_limit()).unwrap();
    assert_eq!(vec!["ds_0", "ds_1"], ctx.data_sources());
    assert_eq!(4, ctx.units.len());
}

#[test]
fn unknown_setting_is_config_error() {
    let err = ConfigProps::try_from_pairs([("sql_verbose", "true")]).unwrap_err();
    assert_eq!(ErrorKind::Config, err.kind());
}
