//! SQL token generators.
//!
//! Generators run in the fixed order returned by [`default_generators`].
//! Later generators see the tokens earlier ones produced, which is how the
//! encrypt generator extends insert columns and values added for generated
//! keys.

mod encrypt;
mod generated_key;
mod insert_values;
mod pagination;
mod projection;
mod table;

use std::fmt;

pub use encrypt::EncryptTokenGenerator;
pub use generated_key::{GeneratedKeyAssignmentTokenGenerator, GeneratedKeyInsertColumnTokenGenerator};
pub use insert_values::InsertValuesTokenGenerator;
pub use pagination::{OffsetTokenGenerator, RowCountTokenGenerator};
pub use projection::{AggregationDistinctTokenGenerator, OrderByTokenGenerator, ProjectionsTokenGenerator};
use sharding_error::Result;
pub use table::TableTokenGenerator;
use tracing::trace;

use super::parameter::ParameterBuilder;
use super::token::SqlToken;
use crate::condition::generated_key::GeneratedKeyContext;
use crate::route::context::{RouteContext, RouteResult};
use crate::rule::ShardingRule;
use crate::statement::SqlStatementContext;
use crate::value::ScalarValue;

/// Everything a generator may look at.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorContext<'a> {
    pub rule: &'a ShardingRule,
    pub route: &'a RouteContext,
}

impl<'a> GeneratorContext<'a> {
    pub fn new(rule: &'a ShardingRule, route: &'a RouteContext) -> Self {
        GeneratorContext { rule, route }
    }

    pub fn statement(&self) -> &'a SqlStatementContext {
        &self.route.logic_sql.statement
    }

    pub fn parameters(&self) -> &'a [ScalarValue] {
        &self.route.logic_sql.parameters
    }

    pub fn route_result(&self) -> &'a RouteResult {
        &self.route.route_result
    }

    pub fn generated_key(&self) -> Option<&'a GeneratedKeyContext> {
        self.route.generated_key.as_ref()
    }

    pub fn is_single_routing(&self) -> bool {
        self.route.route_result.is_single_routing()
    }
}

pub trait TokenGenerator: fmt::Debug + Sync + Send {
    fn name(&self) -> &'static str;

    fn is_applicable(&self, ctx: &GeneratorContext<'_>) -> bool;

    /// Skip this generator when the statement routes to exactly one unit.
    /// Used by generators that only exist to make the merge correct.
    fn ignore_for_single_route(&self) -> bool {
        false
    }

    /// Produce tokens. `previous` holds the tokens of earlier generators.
    fn generate(
        &self,
        ctx: &GeneratorContext<'_>,
        previous: &mut [SqlToken],
        parameters: &mut ParameterBuilder,
    ) -> Result<Vec<SqlToken>>;
}

/// The generator chain in the order it runs.
pub fn default_generators() -> Vec<Box<dyn TokenGenerator>> {
    vec![
        Box::new(TableTokenGenerator),
        Box::new(ProjectionsTokenGenerator),
        Box::new(OrderByTokenGenerator),
        Box::new(AggregationDistinctTokenGenerator),
        Box::new(OffsetTokenGenerator),
        Box::new(RowCountTokenGenerator),
        Box::new(GeneratedKeyInsertColumnTokenGenerator),
        Box::new(GeneratedKeyAssignmentTokenGenerator),
        Box::new(InsertValuesTokenGenerator),
        Box::new(EncryptTokenGenerator),
    ]
}

/// Run every applicable generator.
pub fn generate_tokens(
    generators: &[Box<dyn TokenGenerator>],
    ctx: &GeneratorContext<'_>,
    parameters: &mut ParameterBuilder,
) -> Result<Vec<SqlToken>> {
    let mut tokens = Vec::new();
    for generator in generators {
        if generator.ignore_for_single_route() && ctx.is_single_routing() {
            continue;
        }
        if !generator.is_applicable(ctx) {
            continue;
        }
        let generated = generator.generate(ctx, &mut tokens, parameters)?;
        trace!(generator = generator.name(), tokens = generated.len(), "generated tokens");
        tokens.extend(generated);
    }
    Ok(tokens)
}
