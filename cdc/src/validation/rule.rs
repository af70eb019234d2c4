use config::shared::{ExpectationAction, ExpectationConfig};

use crate::error::CdcResult;
use crate::types::{Cell, TableSchema};
use crate::validation::ast::Expr;
use crate::validation::parser::parse_expression;
use crate::validation::predicate::Predicate;

/// A named rule compiled against a source schema.
#[derive(Debug, Clone)]
pub struct ValidationRule {
    name: String,
    action: ExpectationAction,
    expression: Expr,
    predicate: Predicate,
}

impl ValidationRule {
    /// Parses and compiles an expectation against `schema`.
    pub fn compile(config: &ExpectationConfig, schema: &TableSchema) -> CdcResult<Self> {
        let expression = parse_expression(&config.constraint)?;
        let predicate = Predicate::compile(&expression, schema)?;

        Ok(Self {
            name: config.name.clone(),
            action: config.action,
            expression,
            predicate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> ExpectationAction {
        self.action
    }

    /// Returns `true` only if the rule evaluates to true for `values`.
    pub fn is_satisfied(&self, values: &[Cell]) -> bool {
        self.predicate.evaluate(values).is_true()
    }

    /// Canonical `name:action:expression` form used to detect rule set changes.
    pub fn signature(&self) -> String {
        format!("{}:{}:{}", self.name, self.action, self.expression)
    }
}
