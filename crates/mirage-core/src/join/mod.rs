pub mod rule_table;
pub mod status;

pub use rule_table::{FkRange, MergedRange, MergedRuleTable, RuleTable, RuleTableManager};
pub use status::JoinStatus;
