//! Applies tokens to the logical SQL text.

use std::cmp::{max, min};

use sharding_error::{Result, ShardingError};

use super::token::SqlToken;
use crate::route::context::RouteUnit;

/// Renders SQL for route units from one sorted token list.
#[derive(Debug)]
pub struct SqlBuilder<'a> {
    sql: &'a str,
    tokens: Vec<&'a SqlToken>,
}

impl<'a> SqlBuilder<'a> {
    /// Sort and validate the tokens against the SQL text.
    ///
    /// Substituted spans must not overlap, except for substitutions sharing a
    /// start where the later one wins.
    pub fn try_new(sql: &'a str, tokens: &'a [SqlToken]) -> Result<Self> {
        let mut sorted: Vec<&SqlToken> = tokens.iter().collect();
        sorted.sort_by(|a, b| a.apply_order(b));
        let mut last_substituted: Option<(usize, usize)> = None;
        for token in &sorted {
            let out_of_range = match token.stop() {
                Some(stop) => stop >= sql.len() || token.start() > stop,
                None => token.start() > sql.len(),
            };
            if out_of_range {
                return Err(span_error("Token span is outside the SQL text", token, sql));
            }
            let Some(stop) = token.stop() else {
                continue;
            };
            if let Some((prev_start, prev_stop)) = last_substituted {
                if token.start() != prev_start && token.start() <= prev_stop {
                    return Err(span_error("Substituted spans overlap", token, sql)
                        .with_field("previous_start", prev_start)
                        .with_field("previous_stop", prev_stop));
                }
            }
            last_substituted = Some((token.start(), stop));
        }
        Ok(SqlBuilder { sql, tokens: sorted })
    }

    /// SQL for one unit, or for the logical statement when `unit` is None.
    pub fn to_sql(&self, unit: Option<&RouteUnit>) -> Result<String> {
        let Some(first) = self.tokens.first() else {
            return Ok(self.sql.to_string());
        };

        let len = self.sql.len();
        let mut out = String::with_capacity(len);
        out.push_str(self.slice(0, first.start(), first)?);

        for (idx, token) in self.tokens.iter().enumerate() {
            let next = self.tokens.get(idx + 1).copied();
            if next.is_some_and(|next| is_superseded(token, next)) {
                continue;
            }
            out.push_str(&token.render(unit));

            let conjunction_start = min(token.stop().map_or(token.start(), |stop| stop + 1), len);
            let conjunction_stop = match next {
                None => len,
                Some(next) => match (token.stop(), next.is_substitutable()) {
                    (Some(stop), true) => max(stop + 1, next.start()),
                    _ => next.start(),
                },
            };
            out.push_str(self.slice(conjunction_start, conjunction_stop, token)?);
        }
        Ok(out)
    }

    fn slice(&self, start: usize, stop: usize, token: &SqlToken) -> Result<&'a str> {
        self.sql
            .get(start..stop)
            .ok_or_else(|| span_error("Tokens overlap or split a character", token, self.sql))
    }
}

/// Two substitutions starting at the same index with different spans. Only
/// the later one renders.
fn is_superseded(token: &SqlToken, next: &SqlToken) -> bool {
    token.is_substitutable()
        && next.is_substitutable()
        && token.start() == next.start()
        && token.stop() != next.stop()
}

fn span_error(msg: &str, token: &SqlToken, sql: &str) -> ShardingError {
    let mut err = ShardingError::rewrite_contract(msg).with_field("start", token.start());
    if let Some(stop) = token.stop() {
        err = err.with_field("stop", stop);
    }
    err.with_field("sql_length", sql.len())
}
