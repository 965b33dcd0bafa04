//! Fixture catalogs and constraint chains shared by the integration tests.

use rust_decimal::Decimal;

use mirage_core::chain::{
    BoolExpr, CompareOperator, ConstraintChain, ConstraintChainNode, FilterNode, FilterOperation,
    FkJoinNode, JoinType, Parameter, PkJoinNode, QueryChains,
};
use mirage_core::config::Settings;
use mirage_core::schema::{Catalog, Column, ColumnType, ForeignKey, Table};
use mirage_core::Result;

pub const NATION_ROWS: i64 = 25;
pub const CUSTOMER_ROWS: i64 = 1000;
pub const ORDERS_ROWS: i64 = 4000;

/// nation ← customer ← orders, sized like a tiny TPC-H slice.
pub fn shop_catalog() -> Result<Catalog> {
    let mut nation = Table::new("nation", NATION_ROWS);
    nation.primary_key = Some("n_nationkey".to_string());
    nation
        .columns
        .push(Column::new("n_regionkey", ColumnType::Integer, 5));

    let mut customer = Table::new("customer", CUSTOMER_ROWS);
    customer.primary_key = Some("c_custkey".to_string());
    customer.foreign_keys.push(foreign_key("c_nationkey", "nation", "n_nationkey"));
    let mut acctbal = Column::new("c_acctbal", ColumnType::Integer, 10_000);
    acctbal.min = -999;
    customer.columns.push(acctbal);
    let mut segment = Column::new("c_mktsegment", ColumnType::Varchar, 5);
    segment.avg_length = Some(10);
    customer.columns.push(segment);

    let mut orders = Table::new("orders", ORDERS_ROWS);
    orders.primary_key = Some("o_orderkey".to_string());
    orders.foreign_keys.push(foreign_key("o_custkey", "customer", "c_custkey"));
    let mut price = Column::new("o_totalprice", ColumnType::Decimal, 50_000);
    price.special_value = 2;
    orders.columns.push(price);
    let mut date = Column::new("o_orderdate", ColumnType::Date, 2_400);
    date.min = 8_035;
    date.null_percentage = Decimal::new(1, 1);
    orders.columns.push(date);

    Catalog::from_tables(vec![orders, customer, nation])
}

/// Two queries over the shop catalog:
///
/// - `q_balance`: customers with `c_acctbal < $1` (30%) joined by orders with
///   `o_totalprice >= $2` (50%); 30% of those orders find a customer.
/// - `q_region`: nations with `n_regionkey = $3` (20%); 80% of customers
///   survive an anti join against them.
pub fn shop_chains() -> QueryChains {
    let mut chains = QueryChains::new();
    chains.insert(
        "q_balance".to_string(),
        vec![
            chain(
                "customer",
                0,
                vec![
                    filter("c_acctbal", CompareOperator::Lt, 1, Decimal::new(3, 1)),
                    pk_join(1, "c_custkey"),
                ],
            ),
            chain(
                "orders",
                1,
                vec![
                    filter("o_totalprice", CompareOperator::Ge, 2, Decimal::new(5, 1)),
                    fk_join("o_custkey", "customer", "c_custkey", 1, JoinType::Inner, Decimal::new(3, 1)),
                ],
            ),
        ],
    );
    chains.insert(
        "q_region".to_string(),
        vec![
            chain(
                "nation",
                0,
                vec![
                    filter("n_regionkey", CompareOperator::Eq, 3, Decimal::new(2, 1)),
                    pk_join(2, "n_nationkey"),
                ],
            ),
            chain(
                "customer",
                1,
                vec![fk_join(
                    "c_nationkey",
                    "nation",
                    "n_nationkey",
                    2,
                    JoinType::Anti,
                    Decimal::new(8, 1),
                )],
            ),
        ],
    );
    chains
}

/// Small batches so every table spans several of them.
pub fn shop_settings(batch_size: usize) -> Settings {
    let mut settings = Settings::default();
    settings.batch_size = batch_size;
    settings.seed = 7;
    settings.threads = 2;
    settings.solver.workers = 2;
    settings
}

pub fn foreign_key(column: &str, ref_table: &str, ref_column: &str) -> ForeignKey {
    ForeignKey {
        column: column.to_string(),
        ref_table: ref_table.to_string(),
        ref_column: ref_column.to_string(),
        ndv: None,
    }
}

pub fn chain(table: &str, index: usize, nodes: Vec<ConstraintChainNode>) -> ConstraintChain {
    ConstraintChain {
        table_name: table.to_string(),
        chain_index: index,
        nodes,
    }
}

/// A single-predicate filter node.
pub fn filter(
    column: &str,
    operator: CompareOperator,
    param_id: u32,
    probability: Decimal,
) -> ConstraintChainNode {
    ConstraintChainNode::Filter(FilterNode {
        probability,
        root: BoolExpr::Filter(FilterOperation::univariate(
            column,
            operator,
            vec![Parameter::new(param_id)],
        )),
    })
}

pub fn pk_join(tag: u32, column: &str) -> ConstraintChainNode {
    ConstraintChainNode::PkJoin(PkJoinNode {
        pk_tag: tag,
        pk_columns: vec![column.to_string()],
    })
}

pub fn fk_join(
    column: &str,
    ref_table: &str,
    ref_column: &str,
    tag: u32,
    join_type: JoinType,
    probability: Decimal,
) -> ConstraintChainNode {
    ConstraintChainNode::FkJoin(FkJoinNode {
        local_columns: vec![column.to_string()],
        ref_table: ref_table.to_string(),
        ref_columns: vec![ref_column.to_string()],
        pk_tag: tag,
        probability,
        distinct_probability: None,
        join_type,
        probability_with_fail_filter: None,
    })
}

/// The documents the analysis stage would hand over: `(schema.json,
/// chains.json)`.
pub fn input_documents(catalog: &Catalog, chains: &QueryChains) -> serde_json::Result<(String, String)> {
    let tables: Vec<&Table> = catalog.tables.values().collect();
    let schema = serde_json::to_string_pretty(&serde_json::json!({ "tables": tables }))?;
    let chains = serde_json::to_string_pretty(chains)?;
    Ok((schema, chains))
}
