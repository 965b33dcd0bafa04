//! The prepare phase: push-down of every chain filter, bucket placement on
//! every column, and instantiation of all parameters.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chain::parameter::{ParamRef, ParameterKind, ABSENT_INDEX};
use crate::chain::pushdown::push_down;
use crate::chain::{BoolExpr, CompareOperator, FilterOperation, FilterTarget, QueryChains};
use crate::config::Settings;
use crate::error::{MirageError, Result};
use crate::schema::{Catalog, PlacementRequest, Table};

/// Outcome of placement on one column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub table: String,
    pub column: String,
    pub requests: usize,
    pub equal_buckets: usize,
    pub segments: usize,
    pub null_ratio: Decimal,
    pub range_size: i64,
    pub extra_cardinality: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrepareReport {
    pub columns: Vec<ColumnSummary>,
    pub parameters: usize,
    pub multivariate_filters: usize,
}

/// Run push-down and bucket placement over every chain, leaving each column
/// with an initialized distribution and each parameter with its data index
/// and rendered value.
pub fn prepare(catalog: &mut Catalog, chains: &mut QueryChains, settings: &Settings) -> Result<PrepareReport> {
    let limit = settings.distribution.reuse_eq_probability_limit;
    for table in catalog.tables.values_mut() {
        for column in &mut table.columns {
            column.init_distribution(&table.name, limit);
        }
    }

    for chain in chains.values_mut().flatten() {
        let table = catalog.table(&chain.table_name)?;
        for node in chain.filter_nodes_mut() {
            push_down(&mut node.root, node.probability, table)?;
        }
    }

    let mut requests: HashMap<(String, String), Vec<PlacementRequest>> = HashMap::new();
    for chain in chains.values().flatten() {
        for node in chain.filter_nodes() {
            for op in node.root.leaves() {
                if let Some(column) = op.column() {
                    requests
                        .entry((chain.table_name.clone(), column.to_string()))
                        .or_default()
                        .push(PlacementRequest {
                            operator: op.operator,
                            probability: op.probability,
                            params: op.parameters.iter().map(ParamRef::from).collect(),
                        });
                }
            }
        }
    }

    let mut report = PrepareReport::default();
    let mut assignments: HashMap<u32, i64> = HashMap::new();
    for table in catalog.tables.values_mut() {
        for column in &mut table.columns {
            let key = (table.name.clone(), column.name.clone());
            let column_requests = requests.remove(&key).unwrap_or_default();
            let (column_type, max_range) = (column.column_type, column.max_range_size());
            let distribution = column.distribution_mut()?;
            distribution.place_all(&column_requests)?;
            let placement = distribution.init_all_parameters()?;
            let (table_name, column_name) = key;
            if let Some(max) = max_range {
                let needed = distribution.range_size();
                if needed > max {
                    return Err(MirageError::unsupported(format!(
                        "{} column {}.{} holds {} values, but its predicates need {}",
                        column_type, table_name, column_name, max, needed
                    )));
                }
            }
            let summary = ColumnSummary {
                table: table_name,
                column: column_name,
                requests: column_requests.len(),
                equal_buckets: distribution.equal_bucket_count(),
                segments: distribution.segments().len(),
                null_ratio: distribution.null_ratio(),
                range_size: distribution.range_size(),
                extra_cardinality: placement.extra_cardinality,
            };
            column.range_size = summary.range_size;
            for (id, data) in placement.assignments {
                match assignments.insert(id, data) {
                    Some(previous) if previous != data => {
                        return Err(MirageError::unsupported(format!(
                            "parameter {} is bound to index {} elsewhere and {} on {}.{}",
                            id, previous, data, summary.table, summary.column
                        )));
                    }
                    _ => {}
                }
            }
            report.columns.push(summary);
        }
    }

    let mut like_patterns = Vec::new();
    for chain in chains.values_mut().flatten() {
        let table_name = chain.table_name.clone();
        for node in chain.filter_nodes_mut() {
            try_walk_mut(&mut node.root, &mut |op| {
                let Some(column) = op.column().map(str::to_string) else {
                    return Ok(());
                };
                let operator = op.operator;
                for param in &mut op.parameters {
                    match assignments.get(&param.id) {
                        Some(&data) => param.data = data,
                        None if operator.is_null_check() => {}
                        None => {
                            return Err(MirageError::State {
                                message: format!(
                                    "parameter {} of {} on {}.{} was not placed",
                                    param.id, operator, table_name, column
                                ),
                            })
                        }
                    }
                    if param.kind == ParameterKind::Like && param.data != ABSENT_INDEX {
                        like_patterns.push((
                            table_name.clone(),
                            column.clone(),
                            param.data,
                            param.data_value.clone(),
                        ));
                    }
                }
                Ok(())
            })?;
        }
    }
    for (table, column, index, pattern) in like_patterns {
        catalog
            .table_mut(&table)?
            .column_mut(&column)?
            .like_patterns
            .insert(index, pattern);
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let sample_size = settings.distribution.multivar_sample_size;
    for chain in chains.values_mut().flatten() {
        let table = catalog.table(&chain.table_name)?;
        for node in chain.filter_nodes_mut() {
            try_walk_mut(&mut node.root, &mut |op| {
                report.parameters += op.parameters.len();
                match op.column() {
                    Some(name) => {
                        let column = table.column(name)?;
                        for param in &mut op.parameters {
                            param.data_value = column.render_parameter(param);
                        }
                    }
                    None => {
                        instantiate_threshold(op, table, sample_size, &mut rng)?;
                        report.multivariate_filters += 1;
                    }
                }
                Ok(())
            })?;
        }
    }

    info!(
        columns = report.columns.len(),
        parameters = report.parameters,
        multivariate = report.multivariate_filters,
        "Prepared distributions"
    );
    Ok(report)
}

/// Rendered value of every parameter that appears in a query, by id.
pub fn parameter_values(chains: &QueryChains) -> BTreeMap<u32, String> {
    let mut values = BTreeMap::new();
    for chain in chains.values().flatten() {
        for node in chain.filter_nodes() {
            for op in node.root.leaves() {
                for param in op.parameters.iter().filter(|p| p.has_literal()) {
                    values.insert(param.id, param.data_value.clone());
                }
            }
        }
    }
    values
}

fn try_walk_mut(
    root: &mut BoolExpr,
    f: &mut dyn FnMut(&mut FilterOperation) -> Result<()>,
) -> Result<()> {
    let mut failure = None;
    root.walk_mut(&mut |op| {
        if failure.is_none() {
            if let Err(e) = f(op) {
                failure = Some(e);
            }
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Threshold of a multivariate comparison: the quantile of the expression
/// over a sample drawn from the finished distributions.
fn instantiate_threshold(
    op: &mut FilterOperation,
    table: &Table,
    sample_size: usize,
    rng: &mut StdRng,
) -> Result<()> {
    if !op.operator.is_range() {
        return Err(MirageError::unsupported(format!(
            "{} over an arithmetic expression (parameters {:?})",
            op.operator,
            op.parameter_ids()
        )));
    }
    let values = {
        let FilterTarget::Expression { expression } = &op.target else {
            return Ok(());
        };
        let mut samples = HashMap::new();
        for name in expression.columns() {
            // sample from a copy so batch carries stay untouched
            let mut distribution = table.column(name)?.distribution()?.clone();
            samples.insert(name, distribution.prepare_tuple_data(sample_size, rng)?);
        }
        let mut values = Vec::with_capacity(sample_size);
        for row in 0..sample_size {
            let value = expression.evaluate_with(&mut |name: &str| {
                let index = samples
                    .get(name)
                    .and_then(|s| s.get(row))
                    .copied()
                    .ok_or_else(|| MirageError::UnknownColumn {
                        column: format!("{}.{}", table.name, name),
                    })?;
                table.column(name)?.numeric(index)
            })?;
            values.extend(value);
        }
        values
    };

    let mut sorted = values;
    sorted.sort_by(f64::total_cmp);
    let target = (op.probability.to_f64().unwrap_or(0.0) * sample_size as f64).round() as usize;
    let threshold = match quantile_threshold(&sorted, target, op.operator) {
        Some(t) => t,
        None => {
            warn!(
                table = %table.name,
                parameters = ?op.parameter_ids(),
                "Expression is NULL on every sampled row, threshold set to 0"
            );
            0.0
        }
    };
    debug!(
        table = %table.name,
        operator = %op.operator,
        probability = %op.probability,
        threshold,
        "Multivariate threshold instantiated"
    );
    op.threshold = Some(threshold);
    for param in &mut op.parameters {
        param.data_value = format_threshold(threshold);
    }
    Ok(())
}

/// Threshold making `operator` TRUE on `k` of the sorted non-null values.
fn quantile_threshold(sorted: &[f64], k: usize, operator: CompareOperator) -> Option<f64> {
    let m = sorted.len();
    if m == 0 {
        return None;
    }
    let k = k.min(m);
    Some(match operator {
        CompareOperator::Lt if k == m => sorted[m - 1] + 1.0,
        CompareOperator::Lt => sorted[k],
        CompareOperator::Le if k == 0 => sorted[0] - 1.0,
        CompareOperator::Le => sorted[k - 1],
        CompareOperator::Gt if k == 0 => sorted[m - 1],
        CompareOperator::Gt if k == m => sorted[0] - 1.0,
        CompareOperator::Gt => sorted[m - k - 1],
        CompareOperator::Ge if k == 0 => sorted[m - 1] + 1.0,
        _ => sorted[m - k],
    })
}

fn format_threshold(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::arithmetic::{ArithmeticNode, ArithmeticOperator};
    use crate::chain::{ConstraintChain, ConstraintChainNode, FilterNode, LogicNode, Parameter};
    use crate::schema::{Column, ColumnType};
    use indexmap::IndexMap;

    fn catalog() -> Catalog {
        let mut lineitem = Table::new("lineitem", 1000);
        lineitem.primary_key = Some("l_id".to_string());
        lineitem.columns.push(Column::new("l_quantity", ColumnType::Integer, 100));
        lineitem.columns.push(Column::new("l_discount", ColumnType::Integer, 50));
        let mut comment = Column::new("l_comment", ColumnType::Varchar, 40);
        comment.avg_length = Some(12);
        lineitem.columns.push(comment);
        Catalog::from_tables(vec![lineitem]).unwrap()
    }

    fn leaf(column: &str, operator: CompareOperator, ids: &[u32]) -> BoolExpr {
        let params = ids.iter().map(|&id| Parameter::new(id)).collect();
        BoolExpr::Filter(FilterOperation::univariate(column, operator, params))
    }

    fn chains(root: BoolExpr, probability: &str) -> QueryChains {
        let mut map = IndexMap::new();
        map.insert(
            "q1".to_string(),
            vec![ConstraintChain {
                table_name: "lineitem".to_string(),
                chain_index: 0,
                nodes: vec![ConstraintChainNode::Filter(FilterNode {
                    probability: probability.parse().unwrap(),
                    root,
                })],
            }],
        );
        map
    }

    fn first_leaf(chains: &QueryChains) -> FilterOperation {
        let chain = &chains["q1"][0];
        chain.filter_nodes().next().unwrap().root.leaves()[0].clone()
    }

    #[test]
    fn test_equality_reserves_one_bucket() {
        let mut catalog = catalog();
        let mut chains = chains(leaf("l_quantity", CompareOperator::Eq, &[1]), "0.25");
        let report = prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();

        let op = first_leaf(&chains);
        let param = &op.parameters[0];
        assert!(param.is_set());
        assert_eq!(param.data_value, (param.data - 1).to_string());

        let column = catalog.table("lineitem").unwrap().column("l_quantity").unwrap();
        let dist = column.distribution().unwrap();
        let bucket = dist.segment_of(param.data).unwrap();
        assert!(bucket.equal);
        assert_eq!(bucket.probability(), "0.25".parse::<Decimal>().unwrap());

        let summary = report.columns.iter().find(|c| c.column == "l_quantity").unwrap();
        assert_eq!(summary.requests, 1);
        assert_eq!(summary.equal_buckets, 1);
        assert_eq!(report.parameters, 1);
    }

    #[test]
    fn test_untouched_columns_are_initialized() {
        let mut catalog = catalog();
        let mut chains = chains(leaf("l_quantity", CompareOperator::Lt, &[1]), "0.4");
        prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();
        let table = catalog.table("lineitem").unwrap();
        for column in &table.columns {
            assert!(column.distribution().unwrap().is_initialized());
        }
    }

    #[test]
    fn test_like_parameter_keeps_pattern() {
        let mut catalog = catalog();
        let mut param = Parameter::with_kind(3, ParameterKind::Like);
        param.data_value = "%green%".to_string();
        let root = BoolExpr::Filter(FilterOperation::univariate(
            "l_comment",
            CompareOperator::Like,
            vec![param],
        ));
        let mut chains = chains(root, "0.1");
        prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();

        let op = first_leaf(&chains);
        assert_eq!(op.parameters[0].data_value, "%green%");
        let column = catalog.table("lineitem").unwrap().column("l_comment").unwrap();
        let rendered = column.render(op.parameters[0].data).unwrap();
        assert!(rendered.contains("green"), "{}", rendered);
    }

    /// One single-filter chain per query, all on `table`.
    fn queries(table: &str, filters: Vec<(BoolExpr, &str)>) -> QueryChains {
        let mut map = IndexMap::new();
        for (i, (root, probability)) in filters.into_iter().enumerate() {
            map.insert(
                format!("q{}", i + 1),
                vec![ConstraintChain {
                    table_name: table.to_string(),
                    chain_index: 0,
                    nodes: vec![ConstraintChainNode::Filter(FilterNode {
                        probability: probability.parse().unwrap(),
                        root,
                    })],
                }],
            );
        }
        map
    }

    fn like_filter(column: &str, operator: CompareOperator, id: u32, pattern: &str) -> BoolExpr {
        let mut param = Parameter::with_kind(id, ParameterKind::Like);
        param.data_value = pattern.to_string();
        BoolExpr::Filter(FilterOperation::univariate(column, operator, vec![param]))
    }

    /// SQL LIKE over ASCII: `%` any run, `_` one character.
    fn like(pattern: &[u8], value: &[u8]) -> bool {
        match (pattern.first(), value.first()) {
            (None, _) => value.is_empty(),
            (Some(b'%'), _) => {
                like(&pattern[1..], value) || (!value.is_empty() && like(pattern, &value[1..]))
            }
            (Some(b'_'), Some(_)) => like(&pattern[1..], &value[1..]),
            (Some(p), Some(v)) if p == v => like(&pattern[1..], &value[1..]),
            _ => false,
        }
    }

    #[test]
    fn test_like_selectivity_holds_on_rendered_values() {
        let mut part = Table::new("part", 10_000);
        part.primary_key = Some("p_partkey".to_string());
        for name in ["p_name", "p_comment"] {
            let mut column = Column::new(name, ColumnType::Varchar, 1000);
            column.avg_length = Some(12);
            part.columns.push(column);
        }
        let mut catalog = Catalog::from_tables(vec![part]).unwrap();
        let mut chains = queries(
            "part",
            vec![
                (like_filter("p_name", CompareOperator::Like, 1, "%a%"), "0.1"),
                (like_filter("p_comment", CompareOperator::NotLike, 2, "%b_c%"), "0.7"),
            ],
        );
        prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();

        let table = catalog.table("part").unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let n = 10_000;
        // (column, pattern, rows selected by the predicate)
        for (name, pattern, negated, expected) in [
            ("p_name", "%a%", false, 1000i64),
            ("p_comment", "%b_c%", true, 7000),
        ] {
            let column = table.column(name).unwrap();
            let mut dist = column.distribution().unwrap().clone();
            let indices = dist.prepare_tuple_data(n, &mut rng).unwrap();
            let selected = indices
                .iter()
                .filter_map(|&i| column.render(i))
                .filter(|v| like(pattern.as_bytes(), v.as_bytes()) != negated)
                .count() as i64;
            assert!(
                (selected - expected).abs() <= 10,
                "{} {}: selected {} rows, expected {}",
                name,
                pattern,
                selected,
                expected
            );
        }
    }

    #[test]
    fn test_bool_column_stays_two_valued() {
        let mut flags = Table::new("flags", 100);
        flags.columns.push(Column::new("active", ColumnType::Bool, 10));
        let mut catalog = Catalog::from_tables(vec![flags.clone()]).unwrap();
        let mut chains = queries("flags", vec![(leaf("active", CompareOperator::Eq, &[1]), "0.4")]);
        let report = prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();
        assert_eq!(report.columns[0].range_size, 2);
        let column = catalog.table("flags").unwrap().column("active").unwrap();
        assert_eq!(column.range_size, 2);

        // two literals plus the remaining rows need three distinct values
        let mut catalog = Catalog::from_tables(vec![flags]).unwrap();
        let mut chains = queries(
            "flags",
            vec![
                (leaf("active", CompareOperator::Eq, &[1]), "0.3"),
                (leaf("active", CompareOperator::Eq, &[2]), "0.2"),
            ],
        );
        let result = prepare(&mut catalog, &mut chains, &Settings::default());
        assert!(matches!(result, Err(MirageError::Unsupported { .. })), "{:?}", result.map(|_| ()));
    }

    /// Column-major sample of bucket indices.
    struct Sample(HashMap<String, Vec<i64>>);

    impl crate::chain::BatchView for Sample {
        fn column_index(&self, column: &str, row: usize) -> Result<i64> {
            self.0
                .get(column)
                .map(|v| v[row])
                .ok_or_else(|| MirageError::UnknownColumn {
                    column: column.to_string(),
                })
        }

        fn column_numeric(&self, _column: &str, _row: usize) -> Result<Option<f64>> {
            Ok(None)
        }
    }

    /// Share of `rows` sampled rows that pass the prepared filter of `q1`.
    fn sampled_share(catalog: &Catalog, chains: &QueryChains, rows: usize) -> f64 {
        let table = catalog.table("lineitem").unwrap();
        let mut rng = StdRng::seed_from_u64(23);
        let mut columns = HashMap::new();
        for name in ["l_quantity", "l_discount"] {
            let mut dist = table.column(name).unwrap().distribution().unwrap().clone();
            columns.insert(name.to_string(), dist.prepare_tuple_data(rows, &mut rng).unwrap());
        }
        let sample = Sample(columns);
        let root = &chains["q1"][0].filter_nodes().next().unwrap().root;
        let hits = (0..rows)
            .filter(|&row| root.evaluate(&sample, row).unwrap())
            .count();
        hits as f64 / rows as f64
    }

    #[test]
    fn test_flattened_and_selects_its_probability() {
        let mut catalog = catalog();
        catalog
            .table_mut("lineitem")
            .unwrap()
            .column_mut("l_discount")
            .unwrap()
            .null_percentage = Decimal::new(2, 1);
        let root = BoolExpr::Logic(LogicNode::and(vec![
            leaf("l_quantity", CompareOperator::Lt, &[1]),
            leaf("l_discount", CompareOperator::Ge, &[2]),
        ]));
        let mut chains = chains(root, "0.3");
        prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();
        let share = sampled_share(&catalog, &chains, 4_000_000);
        assert!((share - 0.3).abs() < 0.001, "share = {}", share);
    }

    #[test]
    fn test_flattened_or_selects_its_probability() {
        let mut catalog = catalog();
        let root = BoolExpr::Logic(LogicNode::or(vec![
            leaf("l_quantity", CompareOperator::Ge, &[1]),
            leaf("l_discount", CompareOperator::Lt, &[2]),
        ]));
        let mut chains = chains(root, "0.5");
        prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();
        let share = sampled_share(&catalog, &chains, 4_000_000);
        assert!((share - 0.5).abs() < 0.001, "share = {}", share);
    }

    #[test]
    fn test_bound_parameter_across_columns_is_unsupported() {
        let mut catalog = catalog();
        let root = BoolExpr::Logic(LogicNode::and(vec![
            leaf("l_quantity", CompareOperator::Lt, &[7]),
            leaf("l_discount", CompareOperator::Eq, &[7]),
        ]));
        let mut chains = chains(root, "0.1");
        let result = prepare(&mut catalog, &mut chains, &Settings::default());
        assert!(matches!(result, Err(MirageError::Unsupported { .. })));
    }

    #[test]
    fn test_multivariate_threshold_matches_probability() {
        let mut catalog = catalog();
        let expression = ArithmeticNode::Binary {
            operator: ArithmeticOperator::Plus,
            left: Box::new(ArithmeticNode::Column {
                column: "l_quantity".to_string(),
            }),
            right: Box::new(ArithmeticNode::Column {
                column: "l_discount".to_string(),
            }),
        };
        let root = BoolExpr::Filter(FilterOperation::multivariate(
            expression.clone(),
            CompareOperator::Lt,
            vec![Parameter::new(9)],
        ));
        let mut chains = chains(root, "0.3");
        let report = prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();
        assert_eq!(report.multivariate_filters, 1);

        let op = first_leaf(&chains);
        let threshold = op.threshold.unwrap();
        assert!(!op.parameters[0].data_value.is_empty());

        // re-sample and check the selected share
        let table = catalog.table("lineitem").unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let n = 20_000;
        let mut q = table.column("l_quantity").unwrap().distribution().unwrap().clone();
        let mut d = table.column("l_discount").unwrap().distribution().unwrap().clone();
        let qs = q.prepare_tuple_data(n, &mut rng).unwrap();
        let ds = d.prepare_tuple_data(n, &mut rng).unwrap();
        let hits = qs
            .iter()
            .zip(&ds)
            .filter(|(a, b)| (((**a - 1) + (**b - 1)) as f64) < threshold)
            .count();
        let share = hits as f64 / n as f64;
        assert!((share - 0.3).abs() < 0.03, "share = {}", share);
    }

    #[test]
    fn test_multivariate_equality_is_unsupported() {
        let mut catalog = catalog();
        let expression = ArithmeticNode::Column {
            column: "l_quantity".to_string(),
        };
        let root = BoolExpr::Filter(FilterOperation::multivariate(
            expression,
            CompareOperator::Eq,
            vec![Parameter::new(2)],
        ));
        let mut chains = chains(root, "0.3");
        let result = prepare(&mut catalog, &mut chains, &Settings::default());
        assert!(matches!(result, Err(MirageError::Unsupported { .. })));
    }

    #[test]
    fn test_parameter_values_by_id() {
        let mut catalog = catalog();
        let root = BoolExpr::Logic(LogicNode::and(vec![
            leaf("l_quantity", CompareOperator::Ge, &[4]),
            leaf("l_discount", CompareOperator::Eq, &[5]),
        ]));
        let mut chains = chains(root, "0.2");
        prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();
        let values = parameter_values(&chains);
        assert_eq!(values.keys().copied().collect::<Vec<_>>(), vec![4, 5]);
        assert!(values.values().all(|v| !v.is_empty()));
    }

    #[test]
    fn test_virtual_parameters_are_not_written_back() {
        let mut catalog = catalog();
        let root = BoolExpr::Filter(FilterOperation::univariate(
            "l_quantity",
            CompareOperator::Lt,
            vec![Parameter::with_kind(6, ParameterKind::Virtual)],
        ));
        let mut chains = chains(root, "0.2");
        prepare(&mut catalog, &mut chains, &Settings::default()).unwrap();
        assert!(first_leaf(&chains).parameters[0].is_set());
        assert!(parameter_values(&chains).is_empty());
    }

    #[test]
    fn test_quantile_threshold_edges() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_threshold(&sorted, 2, CompareOperator::Lt), Some(3.0));
        assert_eq!(quantile_threshold(&sorted, 2, CompareOperator::Le), Some(2.0));
        assert_eq!(quantile_threshold(&sorted, 1, CompareOperator::Gt), Some(3.0));
        assert_eq!(quantile_threshold(&sorted, 1, CompareOperator::Ge), Some(4.0));
        assert_eq!(quantile_threshold(&sorted, 0, CompareOperator::Ge), Some(5.0));
        assert_eq!(quantile_threshold(&[], 1, CompareOperator::Lt), None);
    }
}
